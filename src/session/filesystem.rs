use super::storage::TokenStore;
use crate::error::{ApiError, Result};
use crate::models::Session;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SESSION_FILE_NAME: &str = "session.json";

/// Stores the session as a single JSON file, by default under `~/.cache/pantry-admin`.
pub struct FilesystemTokenStore {
    dir: PathBuf,
}

impl FilesystemTokenStore {
    pub fn new() -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .ok_or_else(|| ApiError::Storage("could not determine cache directory".to_string()))?;
        Ok(Self::with_dir(cache_dir.join("pantry-admin")))
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE_NAME)
    }

    fn ensure_dir(&self) -> Result<&Path> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        Ok(self.dir.as_path())
    }
}

impl TokenStore for FilesystemTokenStore {
    fn load(&self) -> Result<Session> {
        let content = match fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Session::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(session) => Ok(session),
            Err(e) => {
                // A torn or hand-edited file is treated as no session.
                tracing::warn!(path = %self.path().display(), error = %e, "discarding unreadable session file");
                let _ = fs::remove_file(self.path());
                Ok(Session::default())
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        if session.is_empty() {
            return self.clear();
        }

        let dir = self.ensure_dir()?;
        let tmp = dir.join(format!(".{}.tmp", SESSION_FILE_NAME));
        let content = serde_json::to_string_pretty(session)?;
        fs::write(&tmp, content)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, self.path())?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
