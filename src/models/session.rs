use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credentials held by the client and mirrored to durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Absolute expiry instant, stored as epoch millis.
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token_expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.access_token_expiry.is_none()
            && self.refresh_token.is_none()
    }

    /// Token state at `now`. A token without a recorded expiry counts as valid.
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        match (&self.access_token, self.access_token_expiry) {
            (None, _) => TokenState::NoToken,
            (Some(_), Some(expiry)) if now >= expiry => TokenState::Expired,
            (Some(_), _) => TokenState::Valid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Valid,
    Expired,
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenState::NoToken => write!(f, "no token"),
            TokenState::Valid => write!(f, "valid"),
            TokenState::Expired => write!(f, "expired"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_state_transitions_with_expiry() {
        let now = Utc::now();
        let session = Session {
            access_token: Some("abc".to_string()),
            access_token_expiry: Some(now + Duration::seconds(60)),
            refresh_token: None,
        };
        assert_eq!(session.state_at(now), TokenState::Valid);
        assert_eq!(
            session.state_at(now + Duration::seconds(60)),
            TokenState::Expired
        );
    }

    #[test]
    fn test_unknown_expiry_is_valid() {
        let session = Session {
            access_token: Some("abc".to_string()),
            ..Default::default()
        };
        assert_eq!(session.state_at(Utc::now()), TokenState::Valid);
        assert_eq!(Session::default().state_at(Utc::now()), TokenState::NoToken);
    }

    #[test]
    fn test_storage_keys_are_stable() {
        let expiry = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let session = Session {
            access_token: Some("abc".to_string()),
            access_token_expiry: Some(expiry),
            refresh_token: Some("def".to_string()),
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["access_token"], "abc");
        assert_eq!(value["access_token_expiry"], 1_700_000_000_000i64);
        assert_eq!(value["refresh_token"], "def");

        let empty = serde_json::to_string(&Session::default()).unwrap();
        assert_eq!(empty, "{}");
        let parsed: Session = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }
}
