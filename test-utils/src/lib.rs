//! Shared test utilities for the Toto client crates.
//!
//! This crate provides:
//! - Proptest generators for wire types and error responses
//! - Recording and scripted mocks for the store and profile source seams
//! - Test fixtures with sample API payloads

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
