//! Error types for s3-dir-backup.
//!
//! Every step of the pipeline reports failures as a [`BackupError`]. The
//! variants keep the cause of a failure visible to the orchestrator so the
//! process can exit with a code that tells operators what went wrong.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{
    EXIT_CREDENTIALS, EXIT_FAILURE, EXIT_NETWORK, EXIT_NOT_FOUND, EXIT_PERMISSION_DENIED,
    EXIT_USAGE,
};

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, BackupError>;

/// Backup error kinds
#[derive(Debug, Error)]
pub enum BackupError {
    /// A local path or remote bucket does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access to a local path or remote resource was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The storage endpoint could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials could not be resolved
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Any other local I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The ZIP writer rejected an entry
    #[error("Archive error: {0}")]
    Archive(String),

    /// The storage service returned an error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackupError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => {
                BackupError::NotFound(format!("{}: {}", path.display(), err))
            }
            io::ErrorKind::PermissionDenied => {
                BackupError::PermissionDenied(format!("{}: {}", path.display(), err))
            }
            _ => BackupError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            BackupError::NotFound(_) => EXIT_NOT_FOUND,
            BackupError::PermissionDenied(_) => EXIT_PERMISSION_DENIED,
            BackupError::Network(_) => EXIT_NETWORK,
            BackupError::Credentials(_) => EXIT_CREDENTIALS,
            BackupError::Config(_) => EXIT_USAGE,
            BackupError::Io { .. } | BackupError::Archive(_) | BackupError::Storage(_) => {
                EXIT_FAILURE
            }
        }
    }
}

impl From<walkdir::Error> for BackupError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        match err.into_io_error() {
            Some(io_err) => BackupError::from_io(&path, io_err),
            // Only symlink loops end up here
            None => BackupError::Archive(format!("filesystem loop at {}", path.display())),
        }
    }
}
