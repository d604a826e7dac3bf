//! Error types for the tiered cache
//!
//! Provides unified error handling using thiserror.
//!
//! Only construction surfaces errors to callers. Every other failure is
//! logged and degrades to a miss or a skipped write.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the tiered cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache directory could not be created
    #[error("Failed to initialize cache directory {}: {source}", path.display())]
    Initialization {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value could not be converted to bytes
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Stored bytes were corrupt or did not match the expected type
    #[error("Decoding failed: {0}")]
    Decoding(String),

    /// Structured (JSON) serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the tiered cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_error_mentions_path() {
        let err = CacheError::Initialization {
            path: PathBuf::from("/nope/cache"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nope/cache"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: CacheError = parse.unwrap_err().into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
