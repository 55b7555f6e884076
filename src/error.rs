use std::path::PathBuf;

use thiserror::Error;

/// Errors that cross module boundaries. I/O-adjacent failures are caught at
/// the boundary where the I/O happens and surfaced to the user; a malformed
/// motion only ever costs that single motion, never the session.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed motion {id}: {reason}")]
    MalformedMotion { id: String, reason: String },

    #[error("document fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("could not write checkpoint {path}: {reason}")]
    CheckpointWriteFailure { path: PathBuf, reason: String },

    #[error("could not read checkpoint {path}: {reason}")]
    CheckpointReadFailure { path: PathBuf, reason: String },
}

impl Error {
    pub fn malformed(id: &str, reason: impl Into<String>) -> Self {
        Error::MalformedMotion { id: id.to_string(), reason: reason.into() }
    }
}
