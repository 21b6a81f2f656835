//! Error type shared by the locator, loader and settings layers.
//!
//! None of these errors escape a search: the search layer logs them and
//! degrades to fewer results.

use std::path::PathBuf;

/// Error type for kernelspec discovery collaborators.
#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid kernelspec at {path}: {source}")]
    InvalidSpec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, FinderError>;
