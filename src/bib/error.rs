//! Error types for reading bibliography sources.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BibError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BibError {
    /// True when the file is gone rather than unreadable.
    pub fn is_not_found(&self) -> bool {
        match self {
            BibError::Read { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
        }
    }
}
