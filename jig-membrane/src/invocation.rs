//! Caller capabilities: admin tokens and method invocations.

use std::sync::{Mutex, PoisonError};

use jig_codec::{CreationRef, Value};

use crate::error::{MembraneError, Result};
use crate::membrane::{Membrane, Property};

/// Capability for privileged bookkeeping. Only [`with_admin`] hands one out,
/// and it cannot outlive the closure.
pub struct Admin {
    _private: (),
}

/// Run `f` with an admin token. Calls nest freely; nothing global changes.
pub fn with_admin<R>(f: impl FnOnce(&Admin) -> R) -> R {
    let admin = Admin { _private: () };
    f(&admin)
}

/// Who is performing a membrane operation.
#[derive(Clone, Copy)]
pub enum Caller<'a> {
    /// Code outside any method of the creation
    External,
    /// A method running inside an invocation
    Method(&'a Invocation),
    /// Privileged bookkeeping
    Admin(&'a Admin),
}

/// One recorded effect of a method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Call { target: CreationRef, method: String },
    Set { target: CreationRef, key: String, value: Value },
    Delete { target: CreationRef, key: String },
    Insert { target: CreationRef, value: Value },
    InsertEntry { target: CreationRef, key: Value, value: Value },
}

impl Action {
    /// Whether the action changes state.
    pub fn is_update(&self) -> bool {
        !matches!(self, Action::Call { .. })
    }
}

/// A single authorized method call and its ordered action log.
///
/// Invocations are created only by [`Membrane::invoke`], so holding one
/// proves the caller is running inside a method of `target`.
#[derive(Debug)]
pub struct Invocation {
    target: CreationRef,
    method: String,
    actions: Mutex<Vec<Action>>,
}

impl Invocation {
    pub(crate) fn new(target: CreationRef, method: &str) -> Self {
        let invocation = Self {
            target,
            method: method.to_string(),
            actions: Mutex::new(Vec::new()),
        };
        invocation.record(Action::Call {
            target,
            method: method.to_string(),
        });
        invocation
    }

    pub fn target(&self) -> CreationRef {
        self.target
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn record(&self, action: Action) {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner).push(action);
    }

    pub(crate) fn has_updates(&self) -> bool {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(Action::is_update)
    }

    pub(crate) fn into_actions(self) -> Vec<Action> {
        self.actions.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a method body sees.
pub struct MethodScope<'a> {
    pub(crate) this: &'a Membrane,
    pub(crate) invocation: &'a Invocation,
    pub(crate) thisless: bool,
}

impl<'a> MethodScope<'a> {
    /// The receiver. Thisless methods have none.
    pub fn this(&self) -> Result<&'a Membrane> {
        if self.thisless {
            return Err(MembraneError::Thisless(self.invocation.method.clone()));
        }
        Ok(self.this)
    }

    /// Caller identity to pass to membrane operations from inside the method.
    pub fn caller(&self) -> Caller<'a> {
        Caller::Method(self.invocation)
    }

    pub fn invocation(&self) -> &'a Invocation {
        self.invocation
    }
}

/// Result of [`Membrane::invoke`].
#[derive(Debug)]
pub struct Outcome {
    /// Return value, wrapped as a property reached through a method
    pub value: Property,
    /// Ordered action log, beginning with the call itself
    pub actions: Vec<Action>,
}
