//! Error types for per-root watch setup.
//!
//! None of these escape construction: they are rendered into warnings on the
//! log sink and the offending root is skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from setting up a single watch root.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Cannot access directory {path}: {source}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot watch path {path}: {source}")]
    WatchCreation {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl WatchError {
    /// Root the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            WatchError::DirectoryAccess { path, .. } | WatchError::WatchCreation { path, .. } => {
                path
            }
        }
    }
}
