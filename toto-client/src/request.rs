//! Outbound request description.

use reqwest::Method;
use serde_json::Value;

/// A request to the Toto API, relative to the configured base URL.
///
/// Requests are authenticated by default; auth endpoints opt out with
/// [`ApiRequest::without_auth`], which also keeps their 401s away from the
/// refresh logic.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    authenticated: bool,
}

impl ApiRequest {
    /// Create a request. A leading `/` on `path` is ignored.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            path: path.trim_start_matches('/').to_string(),
            query: Vec::new(),
            body: None,
            authenticated: true,
        }
    }

    /// `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT` request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH` request.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Send without a bearer token and never refresh on 401.
    #[must_use]
    pub fn without_auth(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// JSON body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Whether the request carries the session's bearer token.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// One trip of a request through the pipeline.
///
/// The caller's [`ApiRequest`] is never mutated; the retry marker and the
/// token to replay with travel here instead.
#[derive(Debug)]
pub(crate) struct Dispatch<'a> {
    pub(crate) request: &'a ApiRequest,
    pub(crate) already_retried_auth: bool,
    pub(crate) bearer_override: Option<String>,
}

impl<'a> Dispatch<'a> {
    pub(crate) const fn new(request: &'a ApiRequest) -> Self {
        Self {
            request,
            already_retried_auth: false,
            bearer_override: None,
        }
    }

    /// A 401 may start (or join) a refresh at most once per request.
    pub(crate) const fn may_refresh(&self, error: &toto_common::ApiError) -> bool {
        self.request.is_authenticated() && !self.already_retried_auth && error.is_unauthorized()
    }

    pub(crate) fn replay_with(self, token: String) -> Self {
        Self {
            request: self.request,
            already_retried_auth: true,
            bearer_override: Some(token),
        }
    }
}
