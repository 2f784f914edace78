use crate::error::Result;
use crate::models::Session;

/// Durable storage backend for session credentials.
///
/// `save` replaces the whole record so the three fields never drift apart.
pub trait TokenStore: Send + Sync {
    /// Load the stored session; an absent record loads as an empty session.
    fn load(&self) -> Result<Session>;

    /// Replace the stored session.
    fn save(&self, session: &Session) -> Result<()>;

    /// Remove the stored session. Clearing an empty store is a no-op.
    fn clear(&self) -> Result<()>;
}
