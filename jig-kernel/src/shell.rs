//! Shells: identity-stable placeholders that exist before hydration.

use std::sync::Arc;

use jig_codec::{CreationKind, CreationRef, ObjectRef, Props};
use jig_membrane::{Membrane, Rules};

use crate::error::{KernelError, Result};
use crate::hydrate::Hydration;
use crate::kernel::Kernel;
use crate::location::Location;
use crate::recreate::Partial;

/// Preset rules for a creation of `kind`, owned by `creation`.
pub fn rules_for(kind: CreationKind, creation: CreationRef) -> Rules {
    let rules = match kind {
        CreationKind::Code => Rules::code(),
        CreationKind::Jig => Rules::jig_instance(),
        CreationKind::Berry => Rules::berry_instance(),
    };
    rules.with_owner(creation)
}

impl Kernel {
    /// Allocate an empty, membrane-wrapped shell. Nothing is populated until
    /// hydration.
    pub fn create_shell(&self, kind: CreationKind) -> CreationRef {
        let slot = self
            .inner
            .arena
            .allocate(kind, |creation| Membrane::new(ObjectRef::object(), rules_for(kind, creation)));
        let creation = slot.creation();
        tracing::debug!(creation = %creation, "Shell created");
        creation
    }

    /// Install built-in code at a `native://` location.
    ///
    /// Built-ins are hydrated at once and never change. Their methods run
    /// without `this`. States may reference them like any other code.
    pub fn install_builtin(&self, location: &Location, src: impl Into<String>, props: Props) -> Result<CreationRef> {
        if !location.is_native() {
            return Err(KernelError::InvalidLocation(format!("{location} is not a built-in location")));
        }
        let cell = Arc::clone(&self.inner.by_location.entry(location.to_string()).or_default());
        if cell.initialized() {
            return Err(KernelError::InvalidState(format!("{location} is already installed")));
        }

        let slot = self.inner.arena.allocate(CreationKind::Code, |creation| {
            Membrane::new(ObjectRef::object(), Rules::static_code().with_owner(creation))
        });
        let creation = slot.creation();
        self.hydrate(
            creation,
            Hydration {
                location: location.clone(),
                cls: None,
                src: Some(src.into()),
                props,
            },
        )?;
        cell.set(Partial::settled(creation, location.clone()))
            .map_err(|_| KernelError::InvalidState(format!("{location} is already installed")))?;
        tracing::info!(location = %location, creation = %creation, "Built-in installed");
        Ok(creation)
    }
}
