//! Persisted session: the credential pair and the cached user identity.
//!
//! All three entries are written with one `multi_set` and cleared with one
//! `multi_remove`; nothing in this crate touches them individually.

use crate::models::{AuthResponse, RefreshResponse, UserDto};
use crate::store::KeyValueStore;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use toto_common::ApiResult;
use tracing::{debug, warn};

/// Store key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Store key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Store key of the cached user identity (JSON).
pub const USER_KEY: &str = "user";
/// Every key that belongs to a session.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Access and refresh token, redacted in `Debug`.
#[derive(Clone)]
pub struct CredentialPair {
    /// Short-lived bearer token
    pub access_token: SecretString,
    /// Long-lived refresh token
    pub refresh_token: SecretString,
}

impl CredentialPair {
    /// Build a pair from plain strings.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Typed view of the session entries in a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Current access token, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn access_token(&self) -> ApiResult<Option<String>> {
        self.read(ACCESS_TOKEN_KEY).await
    }

    /// Current refresh token, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn refresh_token(&self) -> ApiResult<Option<String>> {
        self.read(REFRESH_TOKEN_KEY).await
    }

    /// Both tokens, if both are present.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn credentials(&self) -> ApiResult<Option<CredentialPair>> {
        let access = self.access_token().await?;
        let refresh = self.refresh_token().await?;
        Ok(access.zip(refresh).map(|(a, r)| CredentialPair::new(a, r)))
    }

    /// Cached identity of the signed-in user.
    ///
    /// A record that no longer parses is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn cached_user(&self) -> ApiResult<Option<UserDto>> {
        let Some(raw) = self.read(USER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cached user record");
                Ok(None)
            }
        }
    }

    /// Persist a full session.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be encoded or the store write fails.
    pub async fn save(&self, credentials: &CredentialPair, user: &UserDto) -> ApiResult<()> {
        let pairs = vec![
            (
                ACCESS_TOKEN_KEY.to_string(),
                credentials.access_token.expose_secret().to_string(),
            ),
            (
                REFRESH_TOKEN_KEY.to_string(),
                credentials.refresh_token.expose_secret().to_string(),
            ),
            (USER_KEY.to_string(), serde_json::to_string(user)?),
        ];
        self.store.multi_set(pairs).await?;
        debug!(user_id = %user.id, "Session saved");
        Ok(())
    }

    /// Persist the session returned by login or registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn save_auth_response(&self, response: &AuthResponse) -> ApiResult<()> {
        let credentials = CredentialPair::new(&response.access_token, &response.refresh_token);
        self.save(&credentials, &response.user).await
    }

    /// Persist the outcome of a token refresh.
    ///
    /// The rotated refresh token and the user record are written alongside
    /// the access token when the server returned them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn store_refreshed(&self, response: &RefreshResponse) -> ApiResult<()> {
        let mut pairs = vec![(ACCESS_TOKEN_KEY.to_string(), response.access_token.clone())];
        if let Some(refresh) = response.refresh_token.as_ref().filter(|t| !t.is_empty()) {
            pairs.push((REFRESH_TOKEN_KEY.to_string(), refresh.clone()));
        }
        if let Some(user) = &response.user {
            pairs.push((USER_KEY.to_string(), serde_json::to_string(user)?));
        }
        self.store.multi_set(pairs).await?;
        Ok(())
    }

    /// Remove every session entry.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store write fails.
    pub async fn clear(&self) -> ApiResult<()> {
        self.store.multi_remove(&SESSION_KEYS).await?;
        debug!("Session cleared");
        Ok(())
    }

    async fn read(&self, key: &str) -> ApiResult<Option<String>> {
        Ok(self.store.get(key).await?.filter(|v| !v.is_empty()))
    }
}
