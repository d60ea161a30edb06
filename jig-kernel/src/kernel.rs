//! The kernel: arena, location index, trust, worldview and class registry
//! behind one cloneable handle.

use std::sync::Arc;

use dashmap::DashMap;
use jig_codec::{deep_clone_all, encode, Container, CreationKind, CreationRef, FnResolver, ObjectRef, Value};
use jig_membrane::{with_admin, Caller, Membrane, Outcome, Rules};
use serde_json::Value as Json;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, warn};

use crate::arena::{Arena, Slot, SlotStatus};
use crate::class::ClassRegistry;
use crate::config::KernelConfig;
use crate::error::{KernelError, Result};
use crate::loader::Loader;
use crate::location::Location;
use crate::recreate::Partial;
use crate::state::CachedState;
use crate::trust::{Trust, TrustList};
use crate::worldview::Worldview;

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelEvent {
    /// A creation finished hydrating
    Loaded { creation: CreationRef, location: String },
    /// Hydration failed and the shell was poisoned
    Failed { location: String, reason: String },
}

pub(crate) struct KernelInner {
    pub(crate) config: KernelConfig,
    pub(crate) arena: Arena,
    /// One cell per location; concurrent recreates share its partial
    pub(crate) by_location: DashMap<String, Arc<OnceCell<Partial>>>,
    pub(crate) trust: Arc<dyn Trust>,
    pub(crate) worldview: Worldview,
    pub(crate) classes: ClassRegistry,
    pub(crate) events: broadcast::Sender<KernelEvent>,
}

/// Handle to one kernel. Clones share state.
#[derive(Clone)]
pub struct Kernel {
    pub(crate) inner: Arc<KernelInner>,
}

impl Kernel {
    /// Kernel trusting the entries listed in `config.trust`.
    pub fn new(config: KernelConfig) -> Self {
        let trust = Arc::new(TrustList::from_entries(config.trust.iter().cloned()));
        Self::with_trust(config, trust)
    }

    pub fn with_trust(config: KernelConfig, trust: Arc<dyn Trust>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(KernelInner {
                config,
                arena: Arena::new(),
                by_location: DashMap::new(),
                trust,
                worldview: Worldview::new(),
                classes: ClassRegistry::new(),
                events,
            }),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    pub fn worldview(&self) -> &Worldview {
        &self.inner.worldview
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.inner.classes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.inner.events.subscribe()
    }

    pub fn slot(&self, creation: &CreationRef) -> Option<Arc<Slot>> {
        self.inner.arena.get(creation)
    }

    pub fn status(&self, creation: &CreationRef) -> Option<SlotStatus> {
        self.slot(creation).map(|slot| slot.status())
    }

    pub fn location_of(&self, creation: &CreationRef) -> Option<Location> {
        self.slot(creation).and_then(|slot| slot.location())
    }

    /// The partial recreated at `location`, if any.
    pub fn partial(&self, location: &Location) -> Option<Partial> {
        self.inner
            .by_location
            .get(&location.to_string())
            .and_then(|cell| cell.get().cloned())
    }

    /// Membrane of a hydrated creation.
    pub fn membrane(&self, creation: &CreationRef) -> Result<Membrane> {
        let slot = self
            .slot(creation)
            .ok_or_else(|| KernelError::Internal(format!("unknown creation {creation}")))?;
        match slot.status() {
            SlotStatus::Ready => Ok(slot.membrane().clone()),
            SlotStatus::Pending => Err(KernelError::Unhydrated(creation.to_string())),
            SlotStatus::Failed(reason) => Err(KernelError::Unusable(reason)),
        }
    }

    pub(crate) fn emit(&self, event: KernelEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Resolve `location` to a hydrated creation.
    ///
    /// With `load_timeout_ms` set, a load that runs over is abandoned and the
    /// shell left unusable.
    pub async fn load(&self, location: &Location, loader: Arc<dyn Loader>) -> Result<CreationRef> {
        let work = async {
            if let Some(partial) = self.partial(location) {
                return partial.ready().await;
            }
            loader
                .load(self, location)
                .await?
                .ok_or_else(|| KernelError::MissingReference(location.to_string()))
        };

        let Some(limit) = self.inner.config.load_timeout() else {
            return work.await;
        };
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                self.abandon(location, "load timed out");
                Err(KernelError::Timeout(location.to_string()))
            }
        }
    }

    fn abandon(&self, location: &Location, reason: &str) {
        let Some(partial) = self.partial(location) else {
            warn!(location = %location, "Load abandoned before a shell existed");
            return;
        };
        let failed = self
            .slot(&partial.creation())
            .map(|slot| slot.fail(reason))
            .unwrap_or(false);
        if failed {
            warn!(location = %location, creation = %partial.creation(), reason, "Hydration abandoned");
            self.emit(KernelEvent::Failed {
                location: location.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    // =========================================================================
    // Methods
    // =========================================================================

    /// Run `method` on a hydrated jig, or a static method on code.
    ///
    /// Container arguments are copied first; the creation never holds a
    /// handle the caller could still write through.
    pub fn call(&self, creation: &CreationRef, method: &str, args: Vec<Value>) -> Result<Outcome> {
        let membrane = self.membrane(creation)?;
        let src = self.class_source(creation, &membrane)?;
        let class = self
            .inner
            .classes
            .get(&src)
            .ok_or_else(|| KernelError::UnknownClass(src.clone()))?;
        if !class.methods().iter().any(|declared| declared == method) {
            return Err(KernelError::UnknownMethod(method.to_string()));
        }

        let args = deep_clone_all(&args);
        debug!(creation = %creation, method, "Calling method");
        let outcome = membrane.invoke(Caller::External, method, |scope| class.call(scope, method, &args))?;
        Ok(outcome)
    }

    /// Writable view over a copy of a hydrated creation's state.
    ///
    /// Writes land in private copies, nested containers included, and the
    /// creation never sees them. Private keys stay hidden.
    pub fn scratch(&self, creation: &CreationRef) -> Result<Membrane> {
        let membrane = self.membrane(creation)?;
        let contents = with_admin(|admin| membrane.snapshot(admin))?;
        Ok(Membrane::new(ObjectRef::new(contents), Rules::cow().with_privacy()))
    }

    fn class_source(&self, creation: &CreationRef, membrane: &Membrane) -> Result<String> {
        let code = match creation.kind() {
            CreationKind::Code => *creation,
            _ => with_admin(|admin| membrane.class(Caller::Admin(admin)))?
                .ok_or_else(|| KernelError::InvalidState(format!("{creation} has no class")))?,
        };
        self.slot(&code)
            .and_then(|slot| slot.src())
            .ok_or_else(|| KernelError::Unhydrated(code.to_string()))
    }

    // =========================================================================
    // Capture
    // =========================================================================

    /// Encode a hydrated creation back into a cached state. References are
    /// written as absolute locations.
    pub fn capture_state(&self, creation: &CreationRef) -> Result<CachedState> {
        let membrane = self.membrane(creation)?;
        let contents = with_admin(|admin| membrane.snapshot(admin))?;
        let (cls, mut props) = match contents {
            Container::Object(props) => (None, props),
            Container::Arbitrary { ty, props } => (Some(ty), props),
            other => {
                return Err(KernelError::InvalidState(format!(
                    "{creation} holds {}",
                    other.type_name()
                )))
            }
        };
        if creation.kind() == CreationKind::Berry {
            // Recomputed from the location on recreate
            props.remove("location");
            props.remove("origin");
        }

        let resolver = FnResolver::new(
            |creation: &CreationRef| self.location_of(creation).map(|loc| Json::String(loc.to_string())),
            |_: &Json| None,
        );
        let encoded = encode(&Value::Object(ObjectRef::from_props(props)), Some(&resolver))?;

        let mut state = CachedState::new(creation.kind(), encoded);
        if let Some(src) = self.slot(creation).and_then(|slot| slot.src()) {
            state = state.with_src(src);
        }
        if let Some(cls) = cls {
            let location = self
                .location_of(&cls)
                .ok_or_else(|| KernelError::InvalidLocation(format!("{cls} has no location")))?;
            state = state.with_cls(location.to_string());
        }
        Ok(state)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}
