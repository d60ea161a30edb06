//! Error types for encoding, decoding and container access.

use thiserror::Error;

/// Errors raised while turning a live value into its wire form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// Symbols have no wire form
    #[error("Cannot encode symbol: {0}")]
    Symbol(String),

    /// Host intrinsics (and explicitly denied objects) cannot be encoded
    #[error("Cannot encode intrinsic: {0}")]
    Intrinsic(String),

    /// A creation was found but no resolver was supplied
    #[error("Cannot encode creation {0} without a reference resolver")]
    NoResolver(String),

    /// The resolver refused to name a creation
    #[error("Unresolvable creation: {0}")]
    Unresolvable(String),

    /// The number cannot be written as JSON
    #[error("Invalid number: {0}")]
    InvalidNumber(f64),
}

/// Errors raised while reconstructing a live value from its wire form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// A node carried more than one `$`-prefixed key
    #[error("Multiple tags on one node: {}", .0.join(", "))]
    MultipleTags(Vec<String>),

    /// The `$`-prefixed key is not a known tag
    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    /// The tag body does not have the expected shape
    #[error("Malformed {tag} node: {reason}")]
    Malformed { tag: String, reason: String },

    /// A `$dup` path points at nothing decoded so far
    #[error("Unresolved duplicate path: {0:?}")]
    UnresolvedDup(Vec<String>),

    /// `$jig` or `$arb` found but no resolver was supplied
    #[error("Cannot decode {0} without a reference resolver")]
    NoResolver(String),

    /// The resolver does not know the referenced creation
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),
}

impl DecodeError {
    pub(crate) fn malformed(tag: &str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the keyed view over a container.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Key has no meaning for this container type
    #[error("Invalid key `{key}` for {container}")]
    InvalidKey {
        container: &'static str,
        key: String,
    },

    /// Value cannot be stored in this container type
    #[error("Invalid value for {container}: {reason}")]
    InvalidValue {
        container: &'static str,
        reason: String,
    },

    /// Growing a sequence would store too many holes
    #[error("Sequence of length {length} would hold {holes} holes")]
    TooSparse { length: usize, holes: usize },

    /// Operation requires a different container type
    #[error("Expected {expected}, found {found}")]
    WrongContainer {
        expected: &'static str,
        found: &'static str,
    },
}
