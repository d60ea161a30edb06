//! Error types for membrane policy checks

use jig_codec::ValueError;
use thiserror::Error;

/// Result type for membrane operations
pub type Result<T> = std::result::Result<T, MembraneError>;

/// Policy violations raised by a [`Membrane`](crate::Membrane).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MembraneError {
    /// Identity field touched from outside, or read before assignment
    #[error("Bindings error: {0}")]
    Bindings(String),

    #[error("Immutable: cannot {0}")]
    Immutable(String),

    #[error("Reserved word: {0}")]
    Reserved(String),

    #[error("Private property: {0}")]
    Privacy(String),

    /// Recorded creations only change inside their own methods
    #[error("Cannot {0} outside of a method")]
    OutsideMethod(String),

    #[error("Method disabled: {0}")]
    DisabledMethod(String),

    #[error("Not callable: {0}")]
    NotCallable(String),

    /// The method runs without an implicit receiver
    #[error("Method has no this: {0}")]
    Thisless(String),

    #[error("Property already defined: {0}")]
    AlreadyDefined(String),

    /// The creation failed to load and must not be used
    #[error("Unusable creation: {0}")]
    Unusable(String),

    #[error(transparent)]
    Value(#[from] ValueError),
}
