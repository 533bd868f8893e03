//! Plugin error types.

use std::path::PathBuf;

use thiserror::Error;

use chatbox_core::TransportError;

/// Errors raised by the SwitchCraft services.
///
/// Jobs and commands log these and carry on; none of them ends a session.
#[derive(Error, Debug)]
pub enum SwitchcraftError {
    /// An HTTP request failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The Krist node answered `ok = false`.
    #[error("Krist API error '{code}': {message}")]
    Krist { code: String, message: String },

    /// A response had an unexpected shape.
    #[error("Unexpected response from {api}: {reason}")]
    Unexpected { api: &'static str, reason: String },

    /// A local file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tracking store is not valid JSON.
    #[error("Corrupt store {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SwitchcraftError {
    pub(crate) fn unexpected(api: &'static str, reason: impl Into<String>) -> Self {
        Self::Unexpected {
            api,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for SwitchCraft services.
pub type SwitchcraftResult<T> = Result<T, SwitchcraftError>;
