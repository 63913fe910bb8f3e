//! Authenticated request pipeline.
//!
//! Every call goes out with the stored bearer token. A 401 on an
//! authenticated request starts a token refresh, or joins the one already in
//! flight, and the request is replayed once with the new token. Only one
//! refresh call is ever in flight per client: the first request to see a 401
//! becomes the leader, later ones park on a one-shot slot until the leader
//! settles, and all of them get the same outcome.

use crate::config::ClientConfig;
use crate::models::RefreshResponse;
use crate::request::{ApiRequest, Dispatch};
use crate::session::SessionStore;
use crate::store::KeyValueStore;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use toto_common::{ApiError, ApiResult, build_http_client};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Path of the token refresh endpoint.
pub const REFRESH_PATH: &str = "auth/refresh";

/// Header carrying a fresh id for every HTTP call, for server-side correlation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const NO_REFRESH_TOKEN: &str = "No refresh token available. Please sign in again.";
const REFRESH_INTERRUPTED: &str = "Session refresh was interrupted. Please try again.";

type RefreshOutcome = ApiResult<String>;

/// Refresh coordination shared by every request of one client.
#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

enum RefreshRole {
    Leader,
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Resets the refresh flag when the leader finishes, even if its future is
/// dropped before settling. Dropped waiters then see a closed channel.
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl RefreshGuard<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.state.lock();
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };
        self.settled = true;

        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Refresh settled");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.state.lock();
            state.in_progress = false;
            state.waiters.clear();
        }
    }
}

/// HTTP client for the Toto API with transparent session refresh.
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    session: SessionStore,
    refresh: Mutex<RefreshState>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client that persists its session in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> ApiResult<Self> {
        let http = build_http_client(&config.http)
            .map_err(|e| ApiError::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            session: SessionStore::new(store),
            refresh: Mutex::new(RefreshState::default()),
        })
    }

    /// Configuration the client was built with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    pub(crate) const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Send a request and decode the JSON response.
    ///
    /// An empty success body decodes as `null`, so `()` and `Option<_>` work
    /// for endpoints that answer 204.
    ///
    /// # Errors
    ///
    /// Returns the normalized [`ApiError`] of the final attempt.
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let value = self.dispatch(&request).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn dispatch(&self, request: &ApiRequest) -> ApiResult<Value> {
        let mut dispatch = Dispatch::new(request);
        loop {
            let bearer = match dispatch.bearer_override.take() {
                Some(token) => Some(token),
                None if dispatch.request.is_authenticated() => self.session.access_token().await?,
                None => None,
            };

            match self.execute(dispatch.request, bearer.as_deref()).await {
                Err(err) if dispatch.may_refresh(&err) => {
                    debug!("Unauthorized, recovering session");
                    let token = self.renewed_access_token(bearer.as_deref()).await?;
                    dispatch = dispatch.replay_with(token);
                }
                result => return result,
            }
        }
    }

    /// Obtain a token to replay with after a 401.
    async fn renewed_access_token(&self, sent_with: Option<&str>) -> RefreshOutcome {
        // A refresh may have settled while this request was in flight.
        if let Some(current) = self.session.access_token().await? {
            if sent_with != Some(current.as_str()) {
                debug!("Access token changed while in flight, replaying");
                return Ok(current);
            }
        }

        let role = {
            let mut state = self.refresh.lock();
            if state.in_progress {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                RefreshRole::Waiter(rx)
            } else {
                state.in_progress = true;
                RefreshRole::Leader
            }
        };

        match role {
            RefreshRole::Waiter(rx) => {
                debug!("Refresh in progress, queued");
                rx.await
                    .unwrap_or_else(|_| Err(ApiError::unauthenticated(REFRESH_INTERRUPTED, None)))
            }
            RefreshRole::Leader => {
                let guard = RefreshGuard {
                    state: &self.refresh,
                    settled: false,
                };
                let outcome = self.refresh_session().await;
                guard.settle(&outcome);
                outcome
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Any failure ends the session: credentials are cleared and the error
    /// becomes [`ApiError::Unauthenticated`].
    #[instrument(skip(self))]
    async fn refresh_session(&self) -> RefreshOutcome {
        match self.request_new_tokens().await {
            Ok(token) => {
                info!("Session refreshed");
                Ok(token)
            }
            Err(err) => {
                let err = err.into_unauthenticated();
                warn!(error = %err, "Session refresh failed, clearing credentials");
                if let Err(clear_err) = self.session.clear().await {
                    warn!(error = %clear_err, "Failed to clear credentials");
                }
                Err(err)
            }
        }
    }

    async fn request_new_tokens(&self) -> RefreshOutcome {
        let Some(refresh_token) = self.session.refresh_token().await? else {
            return Err(ApiError::unauthenticated(NO_REFRESH_TOKEN, None));
        };

        let request = ApiRequest::post(REFRESH_PATH)
            .with_json(json!({ "refreshToken": refresh_token }))
            .without_auth();
        let body = self.execute(&request, None).await?;
        let response: RefreshResponse = serde_json::from_value(body)?;

        self.session.store_refreshed(&response).await?;
        Ok(response.access_token)
    }

    /// Issue one HTTP call and normalize its outcome.
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> ApiResult<Value> {
        let url = self.config.endpoint(request.path())?;
        let request_id = Uuid::new_v4().to_string();
        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .header(REQUEST_ID_HEADER, &request_id);
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, %request_id, "Request failed without a response");
            ApiError::network()
        })?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            warn!(
                error = %e,
                status = status.as_u16(),
                %request_id,
                "Response body could not be read"
            );
            ApiError::network()
        })?;

        if !status.is_success() {
            debug!(status = status.as_u16(), %request_id, "Request rejected");
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refreshing_with_waiter(state: &Mutex<RefreshState>) -> oneshot::Receiver<RefreshOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut guard = state.lock();
        guard.in_progress = true;
        guard.waiters.push(tx);
        rx
    }

    #[tokio::test]
    async fn test_settle_broadcasts_outcome() {
        let state = Mutex::new(RefreshState::default());
        let first = refreshing_with_waiter(&state);
        let second = refreshing_with_waiter(&state);

        let guard = RefreshGuard {
            state: &state,
            settled: false,
        };
        guard.settle(&Ok("tok2".to_string()));

        assert!(!state.lock().in_progress);
        assert!(state.lock().waiters.is_empty());
        assert_eq!(first.await.unwrap(), Ok("tok2".to_string()));
        assert_eq!(second.await.unwrap(), Ok("tok2".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_flag() {
        let state = Mutex::new(RefreshState::default());
        let waiter = refreshing_with_waiter(&state);

        drop(RefreshGuard {
            state: &state,
            settled: false,
        });

        assert!(!state.lock().in_progress);
        assert!(waiter.await.is_err());
    }
}
