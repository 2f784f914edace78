//! Authenticated client for the pantry admin REST API.
//!
//! [`api::ApiClient`] attaches bearer credentials, refreshes them when the
//! server answers 401, and normalizes every failure into [`error::ApiError`].

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod session;

pub use api::{ApiClient, RequestOptions, SessionEvent, TerminationReason};
pub use config::ClientConfig;
pub use error::{ApiError, RefreshError, Result};
