//! Error types for the archive engine.
//!
//! The primary error type is `EngineError`, which represents operation-level
//! failures that end a backup or restore run. Per-entry read failures during a
//! backup are NOT surfaced here: they are converted into synthetic error
//! entries inside the archive and counted on the job record.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that end a backup or restore operation.
///
/// Every variant renders a human-readable message naming the path (when one
/// is involved) and the underlying cause.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A selection or source path does not exist at the time it is needed
    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A selection item is neither a regular file nor a directory
    #[error("Invalid selection: {} ({reason})", path.display())]
    InvalidSelection { path: PathBuf, reason: String },

    /// Read/write/copy failure on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Encryption key cannot be used by the cipher
    #[error("Invalid encryption key: {reason}")]
    InvalidKey { reason: String },

    /// Ciphertext failed integrity verification (tampered, truncated, or wrong key)
    #[error("Decryption failed: wrong key or corrupted archive")]
    Decryption,

    /// Malformed container encountered during restore
    #[error("Malformed archive: {reason}")]
    Format { reason: String },

    /// The requested combination of options is not supported
    #[error("Unsupported option: {reason}")]
    UnsupportedOption { reason: String },

    /// The caller requested cancellation between entries
    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Build an `Io` error, mapping `NotFound` onto the dedicated variant.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            EngineError::NotFound { path }
        } else {
            EngineError::Io { path, source }
        }
    }

    /// Shorthand for a `Format` error.
    pub fn format(reason: impl Into<String>) -> Self {
        EngineError::Format {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_maps_not_found() {
        let err = EngineError::io(
            "/missing/file.txt",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_io_keeps_other_kinds() {
        let err = EngineError::io(
            "/locked.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, EngineError::Io { .. }));
        let message = err.to_string();
        assert!(message.contains("/locked.txt"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_display_names_path() {
        let err = EngineError::InvalidSelection {
            path: PathBuf::from("/dev/null"),
            reason: "not a regular file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid selection: /dev/null (not a regular file or directory)"
        );
    }
}
