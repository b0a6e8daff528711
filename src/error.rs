#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Error types shared by the grading pipeline.

use std::path::{Path, PathBuf};

/// An enum to represent everything that can go wrong while grading a batch.
#[derive(thiserror::Error, Debug)]
pub enum GraderError {
    /// The API key could not be loaded; nothing can be graded without it.
    #[error("Could not load the API key from `{}`: {reason}", path.display())]
    Credential {
        /// Path of the key file that was tried.
        path:   PathBuf,
        /// Why the key could not be used.
        reason: String,
    },
    /// A spreadsheet could not be read or written.
    #[error("Spreadsheet `{}` could not be processed: {reason}", path.display())]
    Spreadsheet {
        /// Path of the offending file.
        path:   PathBuf,
        /// The underlying failure.
        reason: String,
    },
    /// An exchange with the text-generation service failed.
    #[error("Chat completion with model `{model}` failed: {reason}")]
    Completion {
        /// Model the request was addressed to.
        model:  String,
        /// The underlying failure.
        reason: String,
    },
    /// The interaction log could not be appended to.
    #[error("Could not append to interaction log `{}`: {source}", path.display())]
    Transcript {
        /// Path of the log file.
        path:   PathBuf,
        /// The I/O error raised while writing.
        source: std::io::Error,
    },
    /// A configuration file or value was invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GraderError {
    /// Builds a [`GraderError::Spreadsheet`] for `path`.
    pub fn spreadsheet(path: &Path, reason: impl ToString) -> Self {
        Self::Spreadsheet {
            path:   path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`GraderError::Completion`] for a request sent to `model`.
    pub fn completion(model: &str, reason: impl ToString) -> Self {
        Self::Completion {
            model:  model.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`GraderError::Credential`] for the key file at `path`.
    pub fn credential(path: &Path, reason: impl ToString) -> Self {
        Self::Credential {
            path:   path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error came from the remote service rather than
    /// local I/O.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Completion { .. })
    }
}

/// Result alias used across the library.
pub type Result<T, E = GraderError> = std::result::Result<T, E>;
