// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Paygate API Library
//!
//! This crate contains the HTTP server components for Paygate: request
//! routing, bearer-token authentication, the uniform response envelope, and
//! application state wiring.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::AppState;
