use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::clock::{Clock, SystemClock};
use super::mirror::CredentialMirror;
use super::storage::TokenStore;
use crate::error::Result;
use crate::models::{Session, TokenGrant, TokenState};

/// Owns the in-memory session and keeps it in step with durable storage.
///
/// Sets and grants write storage first and memory second; clears run the
/// other way round so memory never keeps a credential. Both happen under one
/// write lock, so readers never see the two disagree. The refresh token lives
/// only in storage.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    mirror: Option<Arc<dyn CredentialMirror>>,
    clock: Arc<dyn Clock>,
    session: RwLock<Session>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            mirror: None,
            clock: Arc::new(SystemClock),
            session: RwLock::new(Session::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn CredentialMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Populate memory from storage, replacing whatever was held.
    pub async fn load(&self) -> Result<TokenState> {
        let mut session = self.session.write().await;
        let stored = self.store.load()?;
        *session = Session {
            access_token: stored.access_token,
            access_token_expiry: stored.access_token_expiry,
            refresh_token: None,
        };
        Ok(session.state_at(self.now()))
    }

    pub async fn set_token(&self, token: &str, expiry: Option<DateTime<Utc>>) -> Result<()> {
        let mut session = self.session.write().await;
        let mut stored = self.store.load()?;
        stored.access_token = Some(token.to_string());
        stored.access_token_expiry = expiry;
        self.store.save(&stored)?;

        session.access_token = Some(token.to_string());
        session.access_token_expiry = expiry;
        if let Some(mirror) = &self.mirror {
            mirror.mirror(token, expiry, self.now());
        }
        tracing::debug!(expiry = ?expiry, "access token stored");
        Ok(())
    }

    pub async fn set_refresh_token(&self, refresh_token: &str) -> Result<()> {
        let _guard = self.session.write().await;
        let mut stored = self.store.load()?;
        stored.refresh_token = Some(refresh_token.to_string());
        self.store.save(&stored)
    }

    /// Store a login or refresh grant in one write, rotating the refresh token if issued.
    pub async fn apply_grant(&self, grant: &TokenGrant) -> Result<()> {
        let mut session = self.session.write().await;
        let mut stored = self.store.load()?;
        stored.access_token = Some(grant.access_token.clone());
        stored.access_token_expiry = grant.expires_at;
        if let Some(refresh_token) = &grant.refresh_token {
            stored.refresh_token = Some(refresh_token.clone());
        }
        self.store.save(&stored)?;

        session.access_token = Some(grant.access_token.clone());
        session.access_token_expiry = grant.expires_at;
        if let Some(mirror) = &self.mirror {
            mirror.mirror(&grant.access_token, grant.expires_at, self.now());
        }
        tracing::debug!(
            expiry = ?grant.expires_at,
            rotated_refresh = grant.refresh_token.is_some(),
            "token grant applied"
        );
        Ok(())
    }

    /// Drop the access token and its expiry from memory, storage and the mirror.
    ///
    /// Clears run memory first, then storage: memory is cleared even when
    /// storage fails, and the storage error is returned.
    pub async fn clear_token(&self) -> Result<()> {
        let mut session = self.session.write().await;
        self.clear_access(&mut session)
    }

    fn clear_access(&self, session: &mut Session) -> Result<()> {
        session.access_token = None;
        session.access_token_expiry = None;
        if let Some(mirror) = &self.mirror {
            mirror.clear();
        }

        let mut stored = self.store.load()?;
        if stored.access_token.is_none() && stored.access_token_expiry.is_none() {
            return Ok(());
        }
        stored.access_token = None;
        stored.access_token_expiry = None;
        self.store.save(&stored)
    }

    /// Drop every credential, refresh token included.
    pub async fn clear_session(&self) -> Result<()> {
        let mut session = self.session.write().await;
        *session = Session::default();
        if let Some(mirror) = &self.mirror {
            mirror.clear();
        }
        self.store.clear()
    }

    pub async fn state(&self) -> TokenState {
        self.session.read().await.state_at(self.now())
    }

    /// True when a token is held and its expiry, if known, lies in the future.
    pub async fn is_token_valid(&self) -> bool {
        self.state().await == TokenState::Valid
    }

    pub async fn access_token(&self) -> Option<String> {
        self.session.read().await.access_token.clone()
    }

    pub async fn expiry(&self) -> Option<DateTime<Utc>> {
        self.session.read().await.access_token_expiry
    }

    /// Refresh tokens are read from durable storage only.
    pub fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self.store.load()?.refresh_token)
    }

    /// Pick the bearer token for an outgoing request.
    ///
    /// A valid in-memory token is used as is. An expired one clears the
    /// token and the request goes out anonymous. With nothing in memory the
    /// stored token is loaded, unless it has already expired.
    pub async fn token_for_request(&self) -> Result<Option<String>> {
        let now = self.now();
        {
            let session = self.session.read().await;
            if session.state_at(now) == TokenState::Valid {
                return Ok(session.access_token.clone());
            }
        }

        // Decide again under the write lock; a refresh may have landed in between.
        let mut session = self.session.write().await;
        match session.state_at(now) {
            TokenState::Valid => Ok(session.access_token.clone()),
            TokenState::Expired => {
                tracing::debug!("access token expired, clearing before request");
                self.clear_access(&mut session)?;
                Ok(None)
            }
            TokenState::NoToken => self.token_from_store(&mut session, now),
        }
    }

    fn token_from_store(&self, session: &mut Session, now: DateTime<Utc>) -> Result<Option<String>> {
        let mut stored = self.store.load()?;
        match stored.state_at(now) {
            TokenState::NoToken => Ok(None),
            TokenState::Valid => {
                session.access_token = stored.access_token.clone();
                session.access_token_expiry = stored.access_token_expiry;
                tracing::debug!("access token restored from storage");
                Ok(stored.access_token)
            }
            TokenState::Expired => {
                tracing::debug!("stored access token expired, discarding");
                stored.access_token = None;
                stored.access_token_expiry = None;
                self.store.save(&stored)?;
                if let Some(mirror) = &self.mirror {
                    mirror.clear();
                }
                Ok(None)
            }
        }
    }
}
