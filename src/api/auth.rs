use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::{finish, ApiClient};
use super::events::{SessionEvent, TerminationReason};
use super::request::{PreparedRequest, RequestOptions};
use crate::error::{ApiError, Result};
use crate::models::{LoginRequest, TokenGrant};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const PROFILE_PATH: &str = "/auth/profile";

/// What a successful sign-in returns besides the stored credentials.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: Option<Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiClient {
    /// Sign in and store the issued access and refresh tokens.
    ///
    /// Bad credentials come back as a plain 401 error; there is nothing to refresh yet.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let request = PreparedRequest {
            method: Method::POST,
            url: self.url_for(LOGIN_PATH),
            body: Some(serde_json::to_value(LoginRequest { email, password })?),
            headers: Default::default(),
        };
        let (status, text) = self.dispatch(&request, None, None).await?;
        let body = finish(status, &text)?;

        let grant = TokenGrant::from_response(&body, self.tokens().now())
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        self.tokens().apply_grant(&grant).await?;
        tracing::info!(expiry = ?grant.expires_at, "signed in");

        let user = body
            .get("data")
            .and_then(|data| data.get("user"))
            .or_else(|| body.get("user"))
            .cloned();

        Ok(LoginOutcome {
            user,
            expires_at: grant.expires_at,
        })
    }

    /// Sign out. The server call is best effort; local credentials are always cleared.
    pub async fn logout(&self) -> Result<()> {
        let token = self.tokens().access_token().await;
        let request = PreparedRequest {
            method: Method::POST,
            url: self.url_for(LOGOUT_PATH),
            body: None,
            headers: Default::default(),
        };
        match self.dispatch(&request, token.as_deref(), None).await {
            Ok((status, _)) if status.is_success() => {}
            Ok((status, text)) => {
                let err = ApiError::from_response(status, &text);
                tracing::warn!(error = %err, "logout request rejected, clearing session anyway");
            }
            Err(err) => {
                tracing::warn!(error = %err, "logout request failed, clearing session anyway");
            }
        }

        let cleared = self.tokens().clear_session().await;
        self.emit(SessionEvent::Terminated {
            reason: TerminationReason::LoggedOut,
        });
        cleared
    }

    /// Fetch the signed-in user's profile, restoring the session from storage if needed.
    ///
    /// An authorization failure that survives token refresh ends the session.
    pub async fn fetch_profile<T: DeserializeOwned>(&self) -> Result<T> {
        let result = self
            .send::<T>(Method::GET, PROFILE_PATH, None, RequestOptions::default())
            .await;

        if let Err(err) = &result {
            if err.is_unauthorized() && !matches!(err, ApiError::Refresh(_)) {
                self.terminate(TerminationReason::Unauthorized, err).await;
            }
        }
        result
    }
}
