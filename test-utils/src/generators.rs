//! Shared proptest generators.
//!
//! This module provides reusable generators for the wire types and error
//! responses of the Toto API.

use proptest::prelude::*;
use serde_json::{Value, json};

/// Generate opaque bearer or refresh tokens.
pub fn token_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{16,64}"
}

/// Generate user ids, numeric or string as servers send them.
pub fn user_id_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (1u64..1_000_000).prop_map(|id| json!(id)),
        "[a-z0-9-]{8,36}".prop_map(|id| json!(id)),
    ]
}

/// Generate user records with optional fields.
pub fn user_json_strategy() -> impl Strategy<Value = Value> {
    (
        user_id_strategy(),
        proptest::option::of("[a-z]{3,12}@[a-z]{3,8}\\.care"),
        proptest::option::of("[A-Z][a-z]{2,10}"),
        proptest::option::of("[A-Z][a-z]{2,10}"),
    )
        .prop_map(|(id, email, first_name, last_name)| {
            let mut user = json!({ "id": id });
            if let Some(email) = email {
                user["email"] = json!(email);
            }
            if let Some(first_name) = first_name {
                user["firstName"] = json!(first_name);
            }
            if let Some(last_name) = last_name {
                user["lastName"] = json!(last_name);
            }
            user
        })
}

/// Generate 4xx status codes other than 401.
pub fn client_status_strategy() -> impl Strategy<Value = u16> {
    (400u16..500).prop_filter("401 is handled by the refresh path", |s| *s != 401)
}

/// Generate 5xx status codes.
pub fn server_status_strategy() -> impl Strategy<Value = u16> {
    500u16..600
}

/// Generate error bodies in the shapes the API has been seen to use.
pub fn error_body_strategy() -> impl Strategy<Value = Vec<u8>> {
    let message = "[a-zA-Z0-9][a-zA-Z0-9 ]{0,39}";
    prop_oneof![
        message.prop_map(|m| json!({ "message": m }).to_string().into_bytes()),
        message.prop_map(|m| json!({ "message": [m, "second"] }).to_string().into_bytes()),
        message.prop_map(|m| json!({ "error": m }).to_string().into_bytes()),
        Just(b"<html>Bad Gateway</html>".to_vec()),
        Just(Vec::new()),
    ]
}
