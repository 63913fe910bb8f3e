//! Integration tests for the authenticated request pipeline.
//!
//! Every test runs the real HTTP stack against a wiremock server.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use test_utils::fixtures::{
    auth_response_json, caregiver, contact_json, refresh_response_json, validation_error_json,
};
use test_utils::mocks::{RecordingStore, StoreOp};
use toto_client::session::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, USER_KEY};
use toto_client::{
    ApiClient, ApiError, ApiRequest, ClientConfig, HttpConfig, KeyValueStore, MemoryStore,
};
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, store: Arc<RecordingStore>) -> ApiClient {
    let config = ClientConfig::new(&format!("{}/api", server.uri())).unwrap();
    ApiClient::new(config, store).unwrap()
}

async fn mount_refresh(server: &MockServer, access: &str, refresh: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "ref1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(refresh_response_json(access, refresh))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn bearer_token_is_attached_from_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/contacts"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([contact_json(1, "Maria")])))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::with_session("tok1", "ref1"));
    let client = client_for(&server, store);

    let contacts = client.contacts().await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].id, "1");
    assert_eq!(contacts[0].name, "Maria");
}

#[tokio::test]
async fn no_authorization_header_without_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(RecordingStore::new()));
    let history = client.history().await.unwrap();
    assert!(history.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
    assert!(requests[0].headers.get("x-request-id").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/(a|b|c)$"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/(a|b|c)$"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(3)
        .mount(&server)
        .await;
    mount_refresh(&server, "tok2", "ref2", 1).await;

    let store = Arc::new(RecordingStore::with_session("tok1", "ref1"));
    let client = client_for(&server, store.clone());

    let (a, b, c) = tokio::join!(
        client.send::<Value>(ApiRequest::get("a")),
        client.send::<Value>(ApiRequest::get("b")),
        client.send::<Value>(ApiRequest::get("c")),
    );

    for result in [a, b, c] {
        assert_eq!(result.unwrap(), json!({ "ok": true }));
    }
    assert_eq!(store.peek(ACCESS_TOKEN_KEY).await.as_deref(), Some("tok2"));
    assert_eq!(store.peek(REFRESH_TOKEN_KEY).await.as_deref(), Some("ref2"));
}

#[tokio::test]
async fn refreshed_token_is_used_by_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reminders"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reminders"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(&server, "tok2", "ref2", 1).await;

    let client = client_for(&server, Arc::new(RecordingStore::with_session("tok1", "ref1")));
    assert!(client.reminders().await.unwrap().is_empty());
    assert!(client.reminders().await.unwrap().is_empty());
}

#[tokio::test]
async fn token_rotated_in_flight_is_replayed_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/history"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/history"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "tok3", "ref3", 0).await;

    let store = Arc::new(RecordingStore::with_session("tok1", "ref1"));
    let client = client_for(&server, store.clone());

    let rotate = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        store
            .multi_set(vec![(ACCESS_TOKEN_KEY.to_string(), "tok2".to_string())])
            .await
            .unwrap();
    };
    let (history, ()) = tokio::join!(client.history(), rotate);

    assert!(history.unwrap().is_empty());
    assert_eq!(store.peek(ACCESS_TOKEN_KEY).await.as_deref(), Some("tok2"));
}

#[tokio::test]
async fn replayed_request_is_not_refreshed_twice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reminders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(&server, "tok2", "ref2", 1).await;

    let client = client_for(&server, Arc::new(RecordingStore::with_session("tok1", "ref1")));
    let err = client.reminders().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.status(), Some(401));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_refresh_signs_everyone_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/(a|b|c)$"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "message": "Refresh token revoked" }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::with_session_and_user("tok1", "ref1", &caregiver()));
    let client = client_for(&server, store.clone());

    let (a, b, c) = tokio::join!(
        client.send::<Value>(ApiRequest::get("a")),
        client.send::<Value>(ApiRequest::get("b")),
        client.send::<Value>(ApiRequest::get("c")),
    );

    let errors = [a.unwrap_err(), b.unwrap_err(), c.unwrap_err()];
    for err in &errors {
        assert!(matches!(err, ApiError::Unauthenticated { status: Some(401), .. }));
        assert_eq!(err, &errors[0]);
    }
    for key in SESSION_KEYS {
        assert_eq!(store.peek(key).await, None, "{key} survived sign-out");
    }

    let removals: Vec<Vec<String>> = store
        .ops()
        .await
        .into_iter()
        .filter_map(|op| match op {
            StoreOp::MultiRemove(keys) => Some(keys),
            _ => None,
        })
        .collect();
    assert_eq!(removals, vec![SESSION_KEYS.map(String::from).to_vec()]);
}

#[tokio::test]
async fn missing_refresh_token_skips_refresh_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/history"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "tok2", "ref2", 0).await;

    let store = Arc::new(MemoryStore::with_entries([(ACCESS_TOKEN_KEY, "tok1")]));
    let config = ClientConfig::new(&format!("{}/api", server.uri())).unwrap();
    let client = ApiClient::new(config, store.clone()).unwrap();

    let err = client.history().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthenticated { status: None, .. }));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn validation_errors_are_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/contacts"))
        .respond_with(ResponseTemplate::new(422).set_body_json(validation_error_json()))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(RecordingStore::with_session("tok1", "ref1")));
    let err = client
        .send::<Value>(ApiRequest::post("contacts").with_json(json!({ "name": "" })))
        .await
        .unwrap_err();

    let normalized = err.to_normalized();
    assert_eq!(normalized.message, "Validation failed");
    assert_eq!(normalized.status, Some(422));
    assert_eq!(normalized.field_errors["email"], "must be a valid email");
    assert_eq!(normalized.field_errors["password"], "is too short");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user/elderly-under-care"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(RecordingStore::with_session("tok1", "ref1")));
    let err = client.elderly_under_care().await.unwrap_err();

    assert!(matches!(err, ApiError::Server { status: 503, .. }));
    assert!(err.is_retryable());
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = ClientConfig::new(&format!("http://127.0.0.1:{port}/api"))
        .unwrap()
        .with_http(HttpConfig::default().with_connect_timeout(Duration::from_secs(1)));
    let client = ApiClient::new(config, Arc::new(RecordingStore::new())).unwrap();

    let err = client.contacts().await.unwrap_err();
    assert_eq!(err, ApiError::network());
    assert_eq!(err.status(), None);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn login_persists_session_in_one_write() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "email": "ana@toto.care", "password": "hunter22" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response_json("tok1", "ref1")))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::new());
    let client = client_for(&server, store.clone());

    let user = client.login("ana@toto.care", "hunter22").await.unwrap();
    assert_eq!(user, caregiver());

    let writes = store.writes().await;
    assert_eq!(writes.len(), 1);
    let StoreOp::MultiSet(pairs) = &writes[0] else {
        panic!("expected a single multi_set, got {writes:?}");
    };
    let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY]);

    assert_eq!(client.current_user().await.unwrap(), Some(caregiver()));
    assert!(client.has_session().await.unwrap());

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn rejected_login_does_not_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "tok2", "ref2", 0).await;

    let store = Arc::new(RecordingStore::with_session("stale", "ref1"));
    let client = client_for(&server, store.clone());

    let err = client.login("ana@toto.care", "wrong").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Unauthorized {
            message: "Invalid credentials".to_string()
        }
    );
    assert!(store.writes().await.is_empty());
}

#[tokio::test]
async fn logout_clears_session() {
    let server = MockServer::start().await;
    let store = Arc::new(RecordingStore::with_session("tok1", "ref1"));
    let client = client_for(&server, store.clone());

    client.logout().await.unwrap();

    assert_eq!(store.peek(ACCESS_TOKEN_KEY).await, None);
    assert!(!client.has_session().await.unwrap());
    assert_eq!(client.current_user().await.unwrap(), None);
}

#[tokio::test]
async fn empty_success_body_decodes_as_unit() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/contacts/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(RecordingStore::with_session("tok1", "ref1")));
    client.delete_contact("7").await.unwrap();
}
