//! Typed endpoints of the Toto API.
//!
//! Thin wrappers over [`ApiClient::send`]. The auth endpoints bypass the
//! refresh logic and persist the session they receive.

use crate::models::{
    AuthResponse, Contact, ContactUpdate, HistoryEntry, NewContact, NewReminder, RegisterRequest,
    Reminder, ReminderUpdate, UserDto,
};
use crate::pipeline::ApiClient;
use crate::request::ApiRequest;
use serde_json::{Value, json};
use toto_common::ApiResult;
use tracing::{info, instrument};

impl ApiClient {
    /// Sign in and persist the returned session.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the login call or a storage error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<UserDto> {
        let request = ApiRequest::post("auth/login")
            .with_json(json!({ "email": email, "password": password }))
            .without_auth();
        let response: AuthResponse = self.send(request).await?;
        self.session().save_auth_response(&response).await?;
        info!(user_id = %response.user.id, "Signed in");
        Ok(response.user)
    }

    /// Create an account and persist the returned session.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the registration call or a storage error.
    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn register(&self, payload: &RegisterRequest) -> ApiResult<UserDto> {
        let request = ApiRequest::post("auth/register")
            .with_json(serde_json::to_value(payload)?)
            .without_auth();
        let response: AuthResponse = self.send(request).await?;
        self.session().save_auth_response(&response).await?;
        info!(user_id = %response.user.id, "Registered");
        Ok(response.user)
    }

    /// Forget the session.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the credentials cannot be removed.
    pub async fn logout(&self) -> ApiResult<()> {
        self.session().clear().await?;
        info!("Signed out");
        Ok(())
    }

    /// Cached identity of the signed-in user, without a network call.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn current_user(&self) -> ApiResult<Option<UserDto>> {
        self.session().cached_user().await
    }

    /// Whether a refresh token is stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn has_session(&self) -> ApiResult<bool> {
        Ok(self.session().refresh_token().await?.is_some())
    }

    /// Elderly people under the signed-in caregiver's care.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn elderly_under_care(&self) -> ApiResult<Vec<UserDto>> {
        self.send(ApiRequest::get("user/elderly-under-care")).await
    }

    /// List contacts.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn contacts(&self) -> ApiResult<Vec<Contact>> {
        self.send(ApiRequest::get("contacts")).await
    }

    /// Create a contact.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn create_contact(&self, contact: &NewContact) -> ApiResult<Contact> {
        self.send(ApiRequest::post("contacts").with_json(serde_json::to_value(contact)?))
            .await
    }

    /// Update a contact.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn update_contact(&self, id: &str, changes: &ContactUpdate) -> ApiResult<Contact> {
        let request =
            ApiRequest::patch(format!("contacts/{id}")).with_json(serde_json::to_value(changes)?);
        self.send(request).await
    }

    /// Delete a contact.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn delete_contact(&self, id: &str) -> ApiResult<()> {
        self.send::<Value>(ApiRequest::delete(format!("contacts/{id}")))
            .await
            .map(drop)
    }

    /// List reminders.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn reminders(&self) -> ApiResult<Vec<Reminder>> {
        self.send(ApiRequest::get("reminders")).await
    }

    /// Create a reminder.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn create_reminder(&self, reminder: &NewReminder) -> ApiResult<Reminder> {
        self.send(ApiRequest::post("reminders").with_json(serde_json::to_value(reminder)?))
            .await
    }

    /// Update a reminder.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn update_reminder(&self, id: &str, changes: &ReminderUpdate) -> ApiResult<Reminder> {
        let request =
            ApiRequest::patch(format!("reminders/{id}")).with_json(serde_json::to_value(changes)?);
        self.send(request).await
    }

    /// Delete a reminder.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn delete_reminder(&self, id: &str) -> ApiResult<()> {
        self.send::<Value>(ApiRequest::delete(format!("reminders/{id}")))
            .await
            .map(drop)
    }

    /// Conversation and event history, newest first as served.
    ///
    /// # Errors
    ///
    /// Returns the normalized error of the call.
    pub async fn history(&self) -> ApiResult<Vec<HistoryEntry>> {
        self.send(ApiRequest::get("history")).await
    }
}
