//! Property-based tests for toto-client.

use proptest::prelude::*;
use test_utils::{
    client_status_strategy, error_body_strategy, server_status_strategy, token_strategy,
    user_json_strategy,
};
use toto_client::request::ApiRequest;
use toto_client::{ApiError, CredentialPair, UserDto};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// User records decode whatever the id type, and always have a display name.
    #[test]
    fn prop_user_records_decode(raw in user_json_strategy()) {
        let user: UserDto = serde_json::from_value(raw.clone()).unwrap();

        let expected_id = match &raw["id"] {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        prop_assert_eq!(&user.id, &expected_id);
        prop_assert!(!user.display_name().is_empty());
    }

    /// Tokens never leak through Debug output.
    #[test]
    fn prop_credentials_redacted(access in token_strategy(), refresh in token_strategy()) {
        let debug = format!("{:?}", CredentialPair::new(access.clone(), refresh.clone()));

        prop_assert!(!debug.contains(&access));
        prop_assert!(!debug.contains(&refresh));
    }

    /// Client errors are permanent and never trigger a refresh.
    #[test]
    fn prop_client_errors_permanent(
        status in client_status_strategy(),
        body in error_body_strategy(),
    ) {
        let err = ApiError::from_response(status, &body);

        prop_assert!(!err.is_retryable());
        prop_assert!(!err.is_unauthorized());
        prop_assert!(!err.to_string().is_empty());
    }

    /// Server errors are transient whatever their body.
    #[test]
    fn prop_server_errors_transient(
        status in server_status_strategy(),
        body in error_body_strategy(),
    ) {
        let err = ApiError::from_response(status, &body);

        prop_assert!(err.is_retryable());
        prop_assert_eq!(err.status(), Some(status));
    }

    /// A failed refresh always ends as an unauthenticated error.
    #[test]
    fn prop_refresh_failure_is_terminal(status in 400u16..600, body in error_body_strategy()) {
        let err = ApiError::from_response(status, &body).into_unauthenticated();

        let is_unauthenticated = matches!(err, ApiError::Unauthenticated { .. });
        prop_assert!(is_unauthenticated);
        prop_assert_eq!(err.status(), Some(status));
        prop_assert!(!err.is_retryable());
    }

    /// Leading slashes on request paths are ignored.
    #[test]
    fn prop_request_paths_relative(path in "/{0,3}[a-z]{1,10}(/[a-z0-9]{1,8}){0,3}") {
        let request = ApiRequest::get(path.clone());

        prop_assert!(!request.path().starts_with('/'));
        prop_assert_eq!(request.path(), path.trim_start_matches('/'));
        prop_assert!(request.is_authenticated());
    }
}
