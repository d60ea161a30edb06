//! Hydration: filling a shell with its properties and bindings in one
//! admin batch.

use jig_codec::{Container, CreationKind, CreationRef, Props, Value};
use jig_membrane::{is_reserved, with_admin, MembraneError, CODE_PROPS};

use crate::arena::SlotStatus;
use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::location::Location;

/// Everything a shell needs to become a usable creation.
#[derive(Debug, Clone)]
pub struct Hydration {
    /// Where the creation lives; for berries, stamped with the content hash
    pub location: Location,
    /// Owning code, for jigs and berries
    pub cls: Option<CreationRef>,
    /// Type source, for code
    pub src: Option<String>,
    /// Decoded properties, references already resolved
    pub props: Props,
}

/// Identity fields computed at hydration.
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings {
    pub location: String,
    pub origin: String,
    pub nonce: f64,
    pub owner: Value,
    pub satoshis: f64,
}

impl Bindings {
    /// Bindings for a creation at `location`. A relative origin is anchored
    /// to the owning transaction; berries are their own origin.
    pub fn compute(kind: CreationKind, location: &Location, props: &Props) -> Result<Self> {
        let here = location.to_string();
        let origin = match (kind, props.get("origin")) {
            (CreationKind::Berry, _) | (_, None) | (_, Some(Value::Undefined)) => here.clone(),
            (_, Some(Value::String(origin))) => {
                let txid = location
                    .txid()
                    .ok_or_else(|| KernelError::InvalidLocation(here.clone()))?;
                Location::parse(origin)?.resolve(txid).to_string()
            }
            (_, Some(other)) => {
                return Err(KernelError::InvalidState(format!(
                    "origin must be a location, found {}",
                    other.type_name()
                )))
            }
        };
        Ok(Self {
            location: here,
            origin,
            nonce: props.get("nonce").and_then(Value::as_f64).unwrap_or(0.0),
            owner: props.get("owner").cloned().unwrap_or(Value::Null),
            satoshis: props.get("satoshis").and_then(Value::as_f64).unwrap_or(0.0),
        })
    }

    fn apply(self, kind: CreationKind, props: &mut Props) {
        props.insert("location".into(), Value::String(self.location));
        props.insert("origin".into(), Value::String(self.origin));
        if kind != CreationKind::Berry {
            props.insert("nonce".into(), Value::Number(self.nonce));
            props.insert("owner".into(), self.owner);
            props.insert("satoshis".into(), Value::Number(self.satoshis));
        }
    }
}

/// Reserved words cannot be declared, except the few code carries.
fn check_reserved(kind: CreationKind, props: &Props) -> Result<()> {
    let declared = props
        .keys()
        .find(|key| is_reserved(key) && !(kind == CreationKind::Code && CODE_PROPS.contains(&key.as_str())));
    match declared {
        Some(key) => Err(MembraneError::Reserved(key.clone()).into()),
        None => Ok(()),
    }
}

impl Kernel {
    /// Assign properties and bindings onto a pending shell.
    ///
    /// Hydrating a ready shell again is a no-op; a failed shell stays
    /// unusable.
    pub fn hydrate(&self, creation: CreationRef, hydration: Hydration) -> Result<()> {
        let slot = self
            .slot(&creation)
            .ok_or_else(|| KernelError::Internal(format!("no slot for {creation}")))?;
        match slot.status() {
            SlotStatus::Ready => {
                tracing::debug!(creation = %creation, "Already hydrated");
                return Ok(());
            }
            SlotStatus::Failed(reason) => return Err(KernelError::Unusable(reason)),
            SlotStatus::Pending => {}
        }

        let kind = creation.kind();
        let Hydration {
            location,
            cls,
            src,
            mut props,
        } = hydration;
        check_reserved(kind, &props)?;

        let bindings = Bindings::compute(kind, &location, &props)?;
        self.inner.worldview.observe(&bindings.origin, &bindings.location)?;
        bindings.apply(kind, &mut props);

        let contents = match (kind, cls) {
            (CreationKind::Code, None) if src.is_some() => Container::Object(props),
            (CreationKind::Code, None) => {
                return Err(KernelError::InvalidState("code without source".to_string()))
            }
            (CreationKind::Code, Some(_)) => {
                return Err(KernelError::InvalidState("code cannot have a class".to_string()))
            }
            (_, Some(cls)) if cls.kind() == CreationKind::Code => Container::Arbitrary { ty: cls, props },
            (_, Some(cls)) => {
                return Err(KernelError::InvalidState(format!("class {cls} is not code")))
            }
            (_, None) => return Err(KernelError::InvalidState(format!("{kind} without a class"))),
        };

        with_admin(|admin| slot.membrane().replace_contents(admin, contents))?;
        slot.set_location(location);
        match slot.set_ready(src) {
            Ok(()) | Err(SlotStatus::Ready) => Ok(()),
            Err(SlotStatus::Failed(reason)) => Err(KernelError::Unusable(reason)),
            Err(SlotStatus::Pending) => Err(KernelError::Internal(format!("{creation} stuck pending"))),
        }
    }
}
