use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RefreshError;

/// Credentials issued by the login and refresh endpoints, in one canonical shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Every field spelling the API has used for these values.
#[derive(Debug, Default, Deserialize)]
struct RawGrant {
    #[serde(default, alias = "accessToken", alias = "token")]
    access_token: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<Value>,
    #[serde(default, alias = "expiresAt", alias = "expiry")]
    expires_at: Option<Value>,
}

impl TokenGrant {
    /// Normalize a login or refresh response body.
    ///
    /// Looks at the top level first, then inside the envelope's `data` object.
    pub fn from_response(body: &Value, now: DateTime<Utc>) -> Result<Self, RefreshError> {
        let candidates = [Some(body), body.get("data")];
        let raw = candidates
            .into_iter()
            .flatten()
            .filter(|v| v.is_object())
            .filter_map(|v| serde_json::from_value::<RawGrant>(v.clone()).ok())
            .find(|raw| raw.access_token.is_some())
            .ok_or_else(|| {
                RefreshError::MalformedResponse("response carries no access token".to_string())
            })?;

        let access_token = raw.access_token.unwrap_or_default();
        if access_token.is_empty() {
            return Err(RefreshError::MalformedResponse(
                "access token is empty".to_string(),
            ));
        }

        let expires_at = match (&raw.expires_in, &raw.expires_at) {
            (Some(secs), _) => Some(expiry_from_seconds(secs, now)?),
            (None, Some(at)) => Some(expiry_from_absolute(at)?),
            (None, None) => None,
        };

        Ok(TokenGrant {
            access_token,
            refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }
}

fn expiry_from_seconds(value: &Value, now: DateTime<Utc>) -> Result<DateTime<Utc>, RefreshError> {
    let secs = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite() && *s >= 0.0)
    .ok_or_else(|| RefreshError::MalformedResponse(format!("invalid expires_in: {}", value)))?;

    let out_of_range = || RefreshError::MalformedResponse(format!("expires_in out of range: {}", value));
    let millis = secs * 1000.0;
    if millis >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    Duration::try_milliseconds(millis as i64)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(out_of_range)
}

fn expiry_from_absolute(value: &Value) -> Result<DateTime<Utc>, RefreshError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        _ => None,
    };
    parsed.ok_or_else(|| RefreshError::MalformedResponse(format!("invalid expiry: {}", value)))
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_snake_case_grant() {
        let grant = TokenGrant::from_response(
            &json!({"access_token": "a1", "refresh_token": "r1", "expires_in": 3600}),
            now(),
        )
        .unwrap();
        assert_eq!(grant.access_token, "a1");
        assert_eq!(grant.refresh_token.as_deref(), Some("r1"));
        assert_eq!(grant.expires_at, Some(now() + Duration::seconds(3600)));
    }

    #[test]
    fn test_camel_case_grant_inside_envelope() {
        let grant = TokenGrant::from_response(
            &json!({
                "success": true,
                "data": {"accessToken": "a2", "expiresIn": "900"},
                "message": "Token refreshed"
            }),
            now(),
        )
        .unwrap();
        assert_eq!(grant.access_token, "a2");
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_at, Some(now() + Duration::seconds(900)));
    }

    #[test]
    fn test_absolute_expiry_variants() {
        let millis = TokenGrant::from_response(
            &json!({"token": "a3", "expiresAt": 1_700_000_600_000i64}),
            now(),
        )
        .unwrap();
        assert_eq!(millis.expires_at, Some(now() + Duration::seconds(600)));

        let rfc = TokenGrant::from_response(
            &json!({"access_token": "a4", "expires_at": "2023-11-14T22:23:20Z"}),
            now(),
        )
        .unwrap();
        assert_eq!(rfc.expires_at, Some(now() + Duration::seconds(600)));
    }

    #[test]
    fn test_missing_expiry_is_unknown() {
        let grant = TokenGrant::from_response(&json!({"accessToken": "a5"}), now()).unwrap();
        assert_eq!(grant.expires_at, None);
    }

    #[test]
    fn test_missing_token_is_malformed() {
        let err = TokenGrant::from_response(&json!({"success": true, "data": {}}), now())
            .unwrap_err();
        assert!(matches!(err, RefreshError::MalformedResponse(_)));

        let err = TokenGrant::from_response(&json!({"access_token": ""}), now()).unwrap_err();
        assert!(matches!(err, RefreshError::MalformedResponse(_)));
    }

    #[test]
    fn test_invalid_expires_in_is_malformed() {
        let err = TokenGrant::from_response(
            &json!({"access_token": "a6", "expires_in": "soon"}),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, RefreshError::MalformedResponse(_)));
    }

    #[test]
    fn test_overflowing_expiry_is_malformed() {
        for body in [
            json!({"accessToken": "a7", "expiresIn": 1e15}),
            json!({"accessToken": "a7", "expiresIn": 1e300}),
            json!({"accessToken": "a7", "expiresIn": "9223372036854775807"}),
            json!({"accessToken": "a7", "expiresAt": i64::MAX}),
        ] {
            let err = TokenGrant::from_response(&body, now()).unwrap_err();
            assert!(matches!(err, RefreshError::MalformedResponse(_)), "{}", body);
        }
    }

    #[test]
    fn test_refresh_request_wire_shape() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "r9" }).unwrap();
        assert_eq!(body, json!({"refreshToken": "r9"}));
    }
}
