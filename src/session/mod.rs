mod clock;
mod filesystem;
mod manager;
mod memory;
mod mirror;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use filesystem::{FilesystemTokenStore, SESSION_FILE_NAME};
pub use manager::TokenManager;
pub use memory::MemoryTokenStore;
pub use mirror::{CookieMirror, CredentialMirror, ACCESS_TOKEN_COOKIE, DEFAULT_COOKIE_MAX_AGE_SECS};
pub use storage::TokenStore;
