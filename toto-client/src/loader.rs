//! Elderly profile loader.
//!
//! The profile of the person under care can only be fetched once the
//! caregiver is signed in, and the first fetch often races the session
//! refresh. The loader retries transient failures (no response, 5xx) with
//! exponential backoff and stops on anything else. An empty list is a
//! definitive "not found", not a transient failure.
//!
//! State is published through a [`watch`] channel so the UI can observe
//! `loading`, `profile` and `error` without polling.

use crate::models::UserDto;
use crate::pipeline::ApiClient;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use toto_common::{ApiError, ApiResult, RetryPolicy};
use tracing::{debug, info, warn};

/// Message of the error set when no profile is linked to the account.
pub const PROFILE_NOT_FOUND: &str = "No elderly person is linked to this account.";

/// Where the loader reads the profile list from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Elderly people under the signed-in caregiver's care.
    async fn elderly_under_care(&self) -> ApiResult<Vec<UserDto>>;
}

#[async_trait]
impl ProfileSource for ApiClient {
    async fn elderly_under_care(&self) -> ApiResult<Vec<UserDto>> {
        Self::elderly_under_care(self).await
    }
}

/// Observable loader state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileState {
    /// Last loaded profile
    pub profile: Option<UserDto>,
    /// Error of the last attempt, if it failed
    pub error: Option<ApiError>,
    /// Whether a load cycle is running, backoff included
    pub loading: bool,
    /// Retries consumed since the last success or refresh
    pub attempt: u32,
}

struct Shared {
    source: Arc<dyn ProfileSource>,
    policy: RetryPolicy,
    state: watch::Sender<ProfileState>,
    generation: AtomicU64,
}

impl Shared {
    /// Apply `update` unless the cycle of `generation` has been superseded.
    fn update(&self, generation: u64, update: impl FnOnce(&mut ProfileState)) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(state);
            true
        })
    }
}

/// Loads the elderly profile with bounded retries.
///
/// Dropping the loader aborts its running cycle.
pub struct ElderlyProfileLoader {
    shared: Arc<Shared>,
    cycle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ElderlyProfileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElderlyProfileLoader")
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ElderlyProfileLoader {
    /// Create an idle loader.
    #[must_use]
    pub fn new(source: Arc<dyn ProfileSource>, policy: RetryPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                policy,
                state: watch::Sender::new(ProfileState::default()),
                generation: AtomicU64::new(0),
            }),
            cycle: Mutex::new(None),
        }
    }

    /// Create a loader reading through `client` with its configured schedule.
    #[must_use]
    pub fn for_client(client: Arc<ApiClient>) -> Self {
        let policy = RetryPolicy::new(client.config().retry.clone());
        Self::new(client, policy)
    }

    /// Start a load cycle.
    ///
    /// No-op while a cycle is already running, backoff included; use
    /// [`refresh`](Self::refresh) to force a new one.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn load(&self) {
        let mut cycle = self.cycle.lock();
        // A cycle clears `loading` in the same update that publishes its
        // outcome, so anyone who saw it cleared may start the next one.
        let started = self.shared.state.send_if_modified(|state| {
            if state.loading && cycle.as_ref().is_some_and(|handle| !handle.is_finished()) {
                return false;
            }
            state.loading = true;
            true
        });
        if !started {
            debug!("Profile load already running");
            return;
        }
        self.spawn_cycle(&mut cycle);
    }

    /// Abort any running cycle, reset the retry state and load again.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn refresh(&self) {
        let mut cycle = self.cycle.lock();
        supersede(&self.shared, &mut cycle);
        self.shared.state.send_modify(|state| {
            state.attempt = 0;
            state.error = None;
            state.loading = true;
        });
        info!("Refreshing elderly profile");
        self.spawn_cycle(&mut cycle);
    }

    /// Abort the running cycle, pending backoff included.
    ///
    /// The last profile and error stay visible.
    pub fn cancel(&self) {
        if self.abort_cycle() {
            debug!("Profile load cancelled");
        }
        self.shared.state.send_modify(|state| state.loading = false);
    }

    /// React to sign-in and sign-out.
    ///
    /// A new identity starts a load; no identity cancels and forgets
    /// everything.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while `identity` is `Some`.
    pub fn on_identity_changed(&self, identity: Option<&UserDto>) {
        match identity {
            Some(user) => {
                debug!(user_id = %user.id, "Identity available");
                self.load();
            }
            None => {
                self.abort_cycle();
                self.shared.state.send_replace(ProfileState::default());
                debug!("Identity gone, profile state reset");
            }
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> ProfileState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        self.shared.state.subscribe()
    }

    /// Wait until no cycle is running and return the resulting state.
    pub async fn settled(&self) -> ProfileState {
        let mut rx = self.shared.state.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        }
    }

    fn spawn_cycle(&self, cycle: &mut Option<JoinHandle<()>>) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        *cycle = Some(tokio::spawn(run_cycle(Arc::clone(&self.shared), generation)));
    }

    fn abort_cycle(&self) -> bool {
        supersede(&self.shared, &mut self.cycle.lock())
    }
}

/// Supersede the current cycle and abort its task.
///
/// Returns whether the task was still running.
fn supersede(shared: &Shared, cycle: &mut Option<JoinHandle<()>>) -> bool {
    shared.generation.fetch_add(1, Ordering::SeqCst);
    cycle.take().is_some_and(|handle| {
        let running = !handle.is_finished();
        handle.abort();
        running
    })
}

impl Drop for ElderlyProfileLoader {
    fn drop(&mut self) {
        self.abort_cycle();
    }
}

async fn run_cycle(shared: Arc<Shared>, generation: u64) {
    loop {
        let attempt = shared.state.borrow().attempt;
        debug!(attempt, is_retry = attempt > 0, "Loading elderly profile");

        match shared.source.elderly_under_care().await {
            Ok(profiles) => {
                let outcome = profiles.into_iter().next();
                let found = outcome.is_some();
                shared.update(generation, |state| {
                    state.loading = false;
                    if let Some(profile) = outcome {
                        state.profile = Some(profile);
                        state.error = None;
                        state.attempt = 0;
                    } else {
                        state.profile = None;
                        state.error = Some(ApiError::not_found(PROFILE_NOT_FOUND));
                    }
                });
                if found {
                    info!("Elderly profile loaded");
                } else {
                    warn!("No elderly profile linked to this account");
                }
                return;
            }
            Err(error) if shared.policy.should_retry(&error, attempt) => {
                let delay = shared.policy.delay_for_attempt(attempt);
                warn!(
                    error = %error,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Profile load failed, retrying"
                );
                let current = shared.update(generation, |state| {
                    state.error = Some(error);
                    state.attempt = attempt + 1;
                });
                if !current {
                    return;
                }
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                warn!(error = %error, attempt, "Profile load failed");
                shared.update(generation, |state| {
                    state.error = Some(error);
                    state.loading = false;
                });
                return;
            }
        }
    }
}
