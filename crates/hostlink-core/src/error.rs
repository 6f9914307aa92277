//! Error taxonomy shared by every hostlink crate.
//!
//! Trust failures are fail-closed: a `TrustRejected` always terminates the
//! connection attempt for that target. File and overwrite errors are per-item
//! inside directory transfers and terminating for single-item commands.

use crate::types::Protocol;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Network or authentication failure for one target.
    #[error("connection to '{host}' failed: {reason}")]
    Connection { host: String, reason: String },

    /// Host key mismatch or operator declined the key.
    #[error("host key for '{host}' rejected ({fingerprint}): {reason}")]
    TrustRejected {
        host: String,
        fingerprint: String,
        reason: String,
    },

    /// Missing or wrong-typed local path.
    #[error("local path '{path}': {reason}")]
    LocalFile { path: String, reason: String },

    /// Missing or wrong-typed remote path.
    #[error("remote path '{path}': {reason}")]
    RemoteFile { path: String, reason: String },

    /// Destination exists and overwrite is disabled.
    #[error("destination '{path}' already exists and overwrite is disabled")]
    OverwriteConflict { path: String },

    /// Trust store unreadable, malformed or unwritable.
    #[error("trust store '{path}': {reason}")]
    Persistence { path: String, reason: String },

    #[error("{protocol} session {id} not found")]
    SessionNotFound { protocol: Protocol, id: usize },

    /// Failure reported by the transport after the session was established.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn connection(host: &str, reason: impl ToString) -> Self {
        Error::Connection {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn trust_rejected(host: &str, fingerprint: &str, reason: impl ToString) -> Self {
        Error::TrustRejected {
            host: host.to_string(),
            fingerprint: fingerprint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn local(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Error::LocalFile {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn remote(path: &str, reason: impl ToString) -> Self {
        Error::RemoteFile {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn overwrite(path: impl ToString) -> Self {
        Error::OverwriteConflict {
            path: path.to_string(),
        }
    }

    pub fn persistence(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Error::Persistence {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(reason: impl ToString) -> Self {
        Error::Transport(reason.to_string())
    }

    /// Errors that stop a whole directory walk instead of a single item.
    pub fn is_terminating_for_batch(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Connection { .. })
    }

    pub fn is_trust_failure(&self) -> bool {
        matches!(self, Error::TrustRejected { .. })
    }

    pub fn is_overwrite_conflict(&self) -> bool {
        matches!(self, Error::OverwriteConflict { .. })
    }
}
