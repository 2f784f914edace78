use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Why a token refresh could not complete.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Refresh rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error("Malformed refresh response: {0}")]
    MalformedResponse(String),
}

/// Normalized error raised by every client operation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error (status {status}): {message}")]
    Http {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    #[error("API rejected request (status {status}): {message}")]
    Business {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Build an error from a non-2xx response body.
    ///
    /// The server's `message` (or `error`) field wins over the reason phrase,
    /// and the raw payload is kept as `details`.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let details = serde_json::from_str::<Value>(body).ok();
        let message = details
            .as_ref()
            .and_then(server_message)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && details.is_none()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        ApiError::Http {
            status: status.as_u16(),
            message,
            details,
        }
    }

    /// HTTP status, absent for errors where no response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } | ApiError::Business { status, .. } => Some(*status),
            ApiError::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Http { message, .. } | ApiError::Business { message, .. } => message.clone(),
            ApiError::Network { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Raw server error payload, if one was received.
    pub fn details(&self) -> Option<&Value> {
        match self {
            ApiError::Http { details, .. } | ApiError::Business { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// True for every failure where no response was received.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ApiError::Network { .. } | ApiError::Timeout | ApiError::Cancelled
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Network {
                message: format!("Failed to read response body: {}", err),
                source: Some(err),
            }
        } else {
            ApiError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

/// Pull a human-readable message out of an error payload.
pub(crate) fn server_message(payload: &Value) -> Option<String> {
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_response_prefers_server_message() {
        let err = ApiError::from_response(StatusCode::NOT_FOUND, r#"{"message":"Not found"}"#);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.message(), "Not found");
        assert_eq!(err.details(), Some(&json!({"message": "Not found"})));
    }

    #[test]
    fn test_from_response_falls_back_to_error_field() {
        let err = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"error":"Barcode already registered"}"#,
        );
        assert_eq!(err.message(), "Barcode already registered");
    }

    #[test]
    fn test_from_response_plain_text_body() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.message(), "upstream down");
        assert!(err.details().is_none());
    }

    #[test]
    fn test_from_response_empty_body_uses_reason() {
        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.message(), "Internal Server Error");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_network_errors_have_no_status() {
        assert_eq!(ApiError::Timeout.status(), None);
        assert!(ApiError::Timeout.is_network());
        assert!(ApiError::Cancelled.is_network());
        assert!(ApiError::Cancelled.is_cancelled());
        assert!(!ApiError::Timeout.is_cancelled());
    }

    #[test]
    fn test_refresh_errors_are_distinguishable() {
        let missing = ApiError::from(RefreshError::NoRefreshToken);
        assert_eq!(missing.message(), "No refresh token available");
        assert_eq!(missing.status(), None);

        let rejected = ApiError::from(RefreshError::Rejected {
            status: 401,
            message: "Invalid refresh token".to_string(),
        });
        assert!(rejected.is_unauthorized());
        assert!(matches!(
            rejected,
            ApiError::Refresh(RefreshError::Rejected { .. })
        ));
    }
}
