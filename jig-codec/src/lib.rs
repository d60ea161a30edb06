//! Deterministic tagged-JSON codec for creation state graphs
//!
//! Live values (primitives, containers, creation references) are written as
//! plain JSON, with `$`-prefixed tag keys marking everything JSON cannot say
//! directly: undefined, special numbers, sparse arrays, sets, maps, binary
//! buffers, references to other creations and repeated or cyclic objects.
//!
//! # Key Components
//!
//! - [`Value`] / [`ObjectRef`] / [`Container`]: the live value graph
//! - [`encode`] / [`Encoder`]: live graph → canonical JSON
//! - [`decode`] / [`Decoder`]: JSON → live graph, identity-preserving
//! - [`ReferenceResolver`]: maps creations to the identifiers in `$jig` nodes
//!
//! # Example
//!
//! ```ignore
//! use jig_codec::{decode, encode, Value};
//!
//! let value = Value::object([("n", Value::from(1))]);
//! let json = encode(&value, None)?;
//! let back = decode(&json, None)?;
//! ```

pub mod decode;
pub mod encode;
pub mod error;
pub mod resolver;
pub mod tags;
pub mod value;

pub use decode::{decode, Decoder};
pub use encode::{encode, Encoder};
pub use error::{DecodeError, EncodeError, ValueError};
pub use resolver::{FnResolver, ReferenceResolver};
pub use value::{
    deep_clone_all, Container, CreationKind, CreationRef, ObjectRef, Props, SlotId, Value, MAX_ARRAY_HOLES,
    MAX_ARRAY_LENGTH,
};
