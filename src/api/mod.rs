pub mod auth;
pub mod client;
pub mod events;
pub mod request;

pub use auth::{LoginOutcome, LOGIN_PATH, LOGOUT_PATH, PROFILE_PATH};
pub use client::{ApiClient, ApiClientBuilder, REFRESH_PATH};
pub use events::{SessionEvent, TerminationReason};
pub use request::RequestOptions;
