//! Shared library for cross-cutting concerns in the Toto companion client.
//!
//! This crate provides centralized implementations for:
//! - The normalized API error type with transient/permanent classification
//! - HTTP client configuration and building
//! - Retry policies with exponential backoff
//! - Tracing subscriber initialization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use error::{ApiError, ApiResult, FieldErrors, NormalizedError};
pub use http::{HttpConfig, build_http_client};
pub use retry::{RetryConfig, RetryPolicy};
pub use tracing_config::{TracingConfig, init_tracing};
