//! Test fixtures with sample data.
//!
//! Payloads are built as JSON so they can be served by mock servers as-is
//! and decoded into the client's types where a typed value is needed.

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use toto_client::UserDto;
use toto_common::ApiError;
use uuid::Uuid;

/// Sample caregiver account.
#[must_use]
pub fn caregiver_json() -> Value {
    json!({
        "id": "caregiver-1",
        "email": "ana@toto.care",
        "firstName": "Ana",
        "lastName": "Silva",
        "role": "caregiver"
    })
}

/// Sample elderly person under care, with a numeric id as some servers send.
#[must_use]
pub fn elderly_json() -> Value {
    json!({
        "id": 42,
        "firstName": "Rosa",
        "lastName": "Silva",
        "phoneNumber": "+351 912 000 000",
        "role": "elderly",
        "birthDate": "1941-03-02"
    })
}

/// Sample caregiver account.
#[must_use]
pub fn caregiver() -> UserDto {
    decode(caregiver_json())
}

/// Sample elderly person under care.
#[must_use]
pub fn elderly() -> UserDto {
    decode(elderly_json())
}

/// Elderly person with a random id.
#[must_use]
pub fn elderly_named(first_name: &str) -> UserDto {
    decode(json!({
        "id": Uuid::new_v4().to_string(),
        "firstName": first_name,
        "role": "elderly"
    }))
}

/// Body of a successful login or registration.
#[must_use]
pub fn auth_response_json(access_token: &str, refresh_token: &str) -> Value {
    json!({
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "tokenType": "Bearer",
        "user": caregiver_json()
    })
}

/// Body of a successful token refresh.
#[must_use]
pub fn refresh_response_json(access_token: &str, refresh_token: &str) -> Value {
    json!({
        "accessToken": access_token,
        "refreshToken": refresh_token
    })
}

/// Body of a 422 validation failure.
#[must_use]
pub fn validation_error_json() -> Value {
    json!({
        "message": "Validation failed",
        "errors": {
            "email": ["must be a valid email"],
            "password": "is too short"
        }
    })
}

/// Sample reminder, due tomorrow.
#[must_use]
pub fn reminder_json(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "scheduledAt": (Utc::now() + Duration::days(1)).to_rfc3339(),
        "recurrence": "daily",
        "isActive": true
    })
}

/// Sample contact.
#[must_use]
pub fn contact_json(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "phoneNumber": "+351 913 000 000",
        "relationship": "daughter"
    })
}

/// A transient server failure.
#[must_use]
pub fn server_error() -> ApiError {
    ApiError::from_response(500, br#"{"message":"Internal server error"}"#)
}

/// A permanent client failure.
#[must_use]
pub fn not_found_response() -> ApiError {
    ApiError::from_response(404, br#"{"message":"Not found"}"#)
}

fn decode(value: Value) -> UserDto {
    match serde_json::from_value(value) {
        Ok(user) => user,
        Err(e) => panic!("fixture does not decode as UserDto: {e}"),
    }
}
