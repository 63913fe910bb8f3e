//! Toto companion API client.
//!
//! Two pieces do the real work here:
//! - [`ApiClient`], the authenticated request pipeline. It attaches the bearer
//!   token, turns a 401 into one shared token refresh, replays the affected
//!   requests and normalizes every failure into [`ApiError`].
//! - [`ElderlyProfileLoader`], which loads the profile of the person under
//!   care through the pipeline and retries transient failures with backoff.
//!
//! Credentials live behind the [`KeyValueStore`] contract so the host
//! application decides where they are persisted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod endpoints;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod request;
pub mod session;
pub mod store;

pub use config::ClientConfig;
pub use loader::{ElderlyProfileLoader, ProfileSource, ProfileState};
pub use models::{
    AuthResponse, Contact, ContactUpdate, HistoryEntry, NewContact, NewReminder, RefreshResponse,
    RegisterRequest, Reminder, ReminderUpdate, UserDto,
};
pub use pipeline::ApiClient;
pub use request::ApiRequest;
pub use session::{CredentialPair, SessionStore};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use toto_common::{ApiError, ApiResult, HttpConfig, NormalizedError, RetryConfig, RetryPolicy};
