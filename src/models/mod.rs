mod envelope;
mod grant;
mod session;

pub use envelope::ApiEnvelope;
pub(crate) use envelope::rejected_envelope;
pub use grant::{LoginRequest, RefreshRequest, TokenGrant};
pub use session::{Session, TokenState};
