//! Persistent storage
//!
//! The only artifact on disk is the OAuth token file the MCP server writes;
//! this module knows where it lives and how to remove it.

pub mod tokens;

use thiserror::Error;

pub use tokens::TokenStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not determine the user home directory")]
    NoHomeDir,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
