//! Error types for the kernel

use jig_codec::{DecodeError, EncodeError};
use jig_membrane::MembraneError;
use thiserror::Error;

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Kernel error types.
///
/// Cloneable so a shared hydration can hand the same failure to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Membrane(#[from] MembraneError),

    /// Code origin not on the trust list
    #[error("Cannot load untrusted code: {0}")]
    Trust(String),

    /// Cached state failed integrity verification
    #[error("Hash mismatch for {location}: expected {expected}, computed {actual}")]
    HashMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    /// A referenced creation never resolved
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// Unrecognized state kind; always a defect upstream
    #[error("Unknown creation kind: {0}")]
    UnknownKind(String),

    /// Two locations claimed for one origin
    #[error("Inconsistent worldview for {origin}: {existing} vs {claimed}")]
    InconsistentWorldview {
        origin: String,
        existing: String,
        claimed: String,
    },

    #[error("Unsupported state version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The shell exists but has not been hydrated yet
    #[error("Creation not hydrated yet: {0}")]
    Unhydrated(String),

    /// Hydration failed or was abandoned
    #[error("Unusable creation: {0}")]
    Unusable(String),

    #[error("No class registered for source: {0}")]
    UnknownClass(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Timed out loading {0}")]
    Timeout(String),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for KernelError {
    fn from(err: tokio::task::JoinError) -> Self {
        KernelError::Internal(err.to_string())
    }
}
