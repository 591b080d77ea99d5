//! Token file store.
//!
//! The MCP server persists OAuth tokens at a fixed path under the user's
//! home directory. The file is opaque to this client: we only report its
//! presence and delete it on `logout`, the server handles everything else.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::UserDirs;

use super::StorageError;

/// Directory under the home dir where the server keeps its state.
const TOKEN_DIR: &str = ".outlook-mcp";
/// Token file name within [`TOKEN_DIR`].
const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store at the fixed location in the user's home directory.
    pub fn new() -> Result<Self, StorageError> {
        let home = UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or(StorageError::NoHomeDir)?;
        Ok(Self {
            path: home.join(TOKEN_DIR).join(TOKEN_FILE),
        })
    }

    /// Store at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a persisted token file exists. The server remains the
    /// authority on whether the tokens inside are still valid.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Last modification time of the token file, if it exists.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    /// Delete the token file. Returns `true` if a file was removed;
    /// a missing file is success, not an error.
    pub fn clear(&self) -> Result<bool, StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_path_shape() {
        let store = TokenStore::new().unwrap();
        assert!(store.path().ends_with(".outlook-mcp/tokens.json"));
    }

    #[test]
    fn test_exists_and_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = TokenStore::with_path(path.clone());

        assert!(!store.exists());
        assert!(store.modified().is_none());

        // Clearing a missing file is a no-op, not an error
        assert!(!store.clear().unwrap());

        std::fs::write(&path, r#"{"access_token":"opaque"}"#).unwrap();
        assert!(store.exists());
        assert!(store.modified().is_some());

        assert!(store.clear().unwrap());
        assert!(!store.exists());
        assert!(!path.exists());
    }
}
