//! Wire types for the Toto REST API.
//!
//! Field names are camelCase on the wire. Resource types keep any fields they
//! do not model in `extra`, so additive server changes survive a round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A user account: the signed-in caregiver or an elderly person under care.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    /// Server identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Given name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Account role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserDto {
    /// Name suitable for display, falling back to the email and then the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        self.email.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// Response of `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Short-lived bearer token
    pub access_token: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Token type, normally `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// The signed-in user
    pub user: UserDto,
}

/// Response of `POST /auth/refresh`.
///
/// Servers that do not rotate refresh tokens may omit `refreshToken`, and the
/// user record is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// New bearer token
    pub access_token: String,
    /// Rotated refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token type, normally `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Fresh copy of the user record
    #[serde(default)]
    pub user: Option<UserDto>,
}

/// Payload of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Email address
    pub email: String,
    /// Plain-text password, sent once over TLS
    pub password: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// An emergency or family contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Server identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name
    pub name: String,
    /// Phone number
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Relationship to the elderly person
    #[serde(default)]
    pub relationship: Option<String>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload for creating a contact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    /// Display name
    pub name: String,
    /// Phone number
    pub phone_number: String,
    /// Relationship to the elderly person
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// Partial update of a contact.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// New relationship
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// A scheduled reminder spoken to the elderly person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Server identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Short title
    pub title: String,
    /// Longer description
    #[serde(default)]
    pub description: Option<String>,
    /// When the reminder fires
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Recurrence rule, e.g. `daily`
    #[serde(default)]
    pub recurrence: Option<String>,
    /// Whether the reminder is enabled
    #[serde(default = "enabled")]
    pub is_active: bool,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload for creating a reminder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    /// Short title
    pub title: String,
    /// Longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the reminder fires
    pub scheduled_at: DateTime<Utc>,
    /// Recurrence rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
}

/// Partial update of a reminder.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderUpdate {
    /// New title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New schedule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// New recurrence rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    /// Enable or disable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// One entry of the companion's conversation and event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Server identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Entry kind, e.g. `call` or `reminder`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Short summary
    #[serde(default)]
    pub summary: Option<String>,
    /// When it happened
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

const fn enabled() -> bool {
    true
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
