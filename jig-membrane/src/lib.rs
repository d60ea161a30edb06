//! Rules and membranes for live creations
//!
//! Every live creation sits behind a [`Membrane`] configured by an immutable
//! [`Rules`] record. The membrane is the only way to reach the creation's
//! container: it enforces immutability, identity bindings, reserved words,
//! private properties and the method-only mutation discipline, and it
//! records what each method invocation changed.
//!
//! # Key Components
//!
//! - [`Rules`]: preset policy records plus the child-property derivation
//! - [`Membrane`]: accessor API consulting the rules on every operation
//! - [`Caller`]: who is asking (outside code, an owner method, or admin)
//! - [`with_admin`]: the only source of the admin capability token
//!
//! # Example
//!
//! ```ignore
//! use jig_membrane::{Caller, Membrane, Rules};
//!
//! let jig = Membrane::new(container, Rules::jig_instance().with_owner(me));
//! let outcome = jig.invoke(Caller::External, "rename", |scope| {
//!     scope.this()?.set(scope.caller(), "name", "b".into())?;
//!     Ok(Value::Undefined)
//! })?;
//! ```

pub mod error;
pub mod invocation;
pub mod membrane;
pub mod rules;
pub mod words;

pub use error::{MembraneError, Result};
pub use invocation::{with_admin, Action, Admin, Caller, Invocation, MethodScope, Outcome};
pub use membrane::{Health, Membrane, Property};
pub use rules::{MethodSet, Rules};
pub use words::{is_binding, is_private, is_reserved, BERRY_BINDINGS, BINDINGS, CODE_PROPS, RESERVED_WORDS};
