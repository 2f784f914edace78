use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::Url;
use std::sync::Arc;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
/// Cookie lifetime used when the token carries no expiry.
pub const DEFAULT_COOKIE_MAX_AGE_SECS: i64 = 60 * 60;

/// Secondary channel that carries the access token for server-side route protection.
pub trait CredentialMirror: Send + Sync {
    fn mirror(&self, token: &str, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>);

    fn clear(&self);
}

/// Mirrors the access token into the cookie jar shared with the HTTP transport.
pub struct CookieMirror {
    jar: Arc<Jar>,
    url: Url,
}

impl CookieMirror {
    pub fn new(jar: Arc<Jar>, url: Url) -> Self {
        Self { jar, url }
    }

    fn secure_attrs(&self) -> &'static str {
        // Browsers drop `Secure` cookies on plain http origins.
        if self.url.scheme() == "https" {
            "; Secure"
        } else {
            ""
        }
    }
}

impl CredentialMirror for CookieMirror {
    fn mirror(&self, token: &str, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        let max_age = expiry
            .map(|at| (at - now).num_seconds().max(0))
            .unwrap_or(DEFAULT_COOKIE_MAX_AGE_SECS);
        let cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Strict{}",
            ACCESS_TOKEN_COOKIE,
            token,
            max_age,
            self.secure_attrs()
        );
        self.jar.add_cookie_str(&cookie, &self.url);
    }

    fn clear(&self) {
        let cookie = format!(
            "{}=; Path=/; Max-Age=0; SameSite=Strict{}",
            ACCESS_TOKEN_COOKIE,
            self.secure_attrs()
        );
        self.jar.add_cookie_str(&cookie, &self.url);
    }
}
