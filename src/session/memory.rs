use super::storage::TokenStore;
use crate::error::{ApiError, Result};
use crate::models::Session;
use std::sync::Mutex;

/// In-process store, for tests and for hosts that manage persistence themselves.
#[derive(Default)]
pub struct MemoryTokenStore {
    session: Mutex<Session>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Session>> {
        self.session
            .lock()
            .map_err(|_| ApiError::Storage("memory store lock poisoned".to_string()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Session> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.lock()? = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = Session::default();
        Ok(())
    }
}
