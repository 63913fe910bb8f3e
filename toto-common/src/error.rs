//! Centralized API error type.
//!
//! Every failure that leaves the client crates is an [`ApiError`]. Raw
//! transport errors never reach callers: responses are normalized here into a
//! small taxonomy that UI code can render, and that retrying code can classify
//! as transient or permanent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field-level validation messages keyed by field name.
pub type FieldErrors = BTreeMap<String, String>;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Message used for every failure where no response was received.
pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to reach the server. Please check your internet connection and try again.";

const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

/// Normalized error for all API operations.
///
/// The type is `Clone` so that a single refresh outcome can be delivered to
/// every request waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, TLS, timeout).
    #[error("{0}")]
    Network(String),

    /// The server answered 401 for an authenticated request.
    #[error("{message}")]
    Unauthorized {
        /// Server-provided or default message
        message: String,
    },

    /// The session cannot be recovered; persisted credentials were cleared.
    #[error("{message}")]
    Unauthenticated {
        /// Reason the session was lost
        message: String,
        /// Status of the failed refresh call, when one was made
        status: Option<u16>,
    },

    /// A 4xx response other than 401.
    #[error("{message}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Server-provided or default message
        message: String,
        /// Field-level validation errors, possibly empty
        field_errors: FieldErrors,
    },

    /// A 5xx response.
    #[error("{message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Server-provided or default message
        message: String,
    },

    /// A lookup succeeded but returned nothing.
    #[error("{0}")]
    NotFound(String),

    /// A request or response body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The credential store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Build the error for a non-success response.
    ///
    /// The body is read as `{message, error, errors}`; anything that does not
    /// parse falls back to a status-based message.
    #[must_use]
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<ErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(ErrorBody::message)
            .unwrap_or_else(|| default_message(status));

        match status {
            401 => Self::Unauthorized { message },
            s if s >= 500 => Self::Server { status: s, message },
            s => Self::Client {
                status: s,
                message,
                field_errors: parsed.map(ErrorBody::field_errors).unwrap_or_default(),
            },
        }
    }

    /// Create a network error with the fixed user-facing message.
    #[must_use]
    pub fn network() -> Self {
        Self::Network(NETWORK_ERROR_MESSAGE.to_string())
    }

    /// Create an unauthenticated error.
    #[must_use]
    pub fn unauthenticated(msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::Unauthenticated {
            message: msg.into(),
            status,
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Convert a failed refresh into the terminal session error.
    #[must_use]
    pub fn into_unauthenticated(self) -> Self {
        match self {
            Self::Unauthenticated { .. } => self,
            Self::Unauthorized { .. } => Self::unauthenticated(SESSION_EXPIRED_MESSAGE, Some(401)),
            other => {
                let status = other.status();
                Self::unauthenticated(other.to_string(), status)
            }
        }
    }

    /// HTTP status associated with the error, if a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Unauthenticated { status, .. } => *status,
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Field-level validation errors, if the server sent any.
    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Client { field_errors, .. } if !field_errors.is_empty() => Some(field_errors),
            _ => None,
        }
    }

    /// Check if this error is a first-class 401.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Check if this error is transient.
    ///
    /// Only network failures and 5xx responses are worth retrying; client
    /// errors, lost sessions and empty results are definitive.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }

    /// The shape handed to UI code.
    #[must_use]
    pub fn to_normalized(&self) -> NormalizedError {
        NormalizedError {
            message: self.to_string(),
            status: self.status(),
            field_errors: self.field_errors().cloned().unwrap_or_default(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Normalized error object `{message, status?, fieldErrors?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    /// Human-readable message
    pub message: String,
    /// HTTP status, absent for network-level failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Field-level validation errors
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: FieldErrors,
}

impl From<&ApiError> for NormalizedError {
    fn from(err: &ApiError) -> Self {
        err.to_normalized()
    }
}

fn default_message(status: u16) -> String {
    match status {
        401 => SESSION_EXPIRED_MESSAGE.to_string(),
        403 => "You do not have permission to perform this action.".to_string(),
        404 => "The requested resource was not found.".to_string(),
        s if s >= 500 => "Something went wrong on our side. Please try again later.".to_string(),
        s => format!("Request failed with status {s}."),
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct FieldErrorEntry {
    #[serde(alias = "property")]
    field: String,
    message: String,
}

impl ErrorBody {
    fn message(&self) -> Option<String> {
        let message = self
            .message
            .clone()
            .map(flatten_field_message)
            .unwrap_or_default();
        if !message.trim().is_empty() {
            return Some(message.trim().to_string());
        }
        self.error.clone().filter(|e| !e.trim().is_empty())
    }

    fn field_errors(self) -> FieldErrors {
        match self.errors {
            Some(serde_json::Value::Object(map)) => map
                .into_iter()
                .map(|(field, value)| (field, flatten_field_message(value)))
                .collect(),
            Some(serde_json::Value::Array(entries)) => entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value::<FieldErrorEntry>(entry).ok())
                .map(|entry| (entry.field, entry.message))
                .collect(),
            _ => FieldErrors::new(),
        }
    }
}

fn flatten_field_message(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(flatten_field_message)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
