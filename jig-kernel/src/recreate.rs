//! Recreating creations from cached state.
//!
//! `recreate` runs in two phases. The first validates the state, enumerates
//! the locations it references and creates the shell; it returns a
//! [`Partial`] as soon as the shell exists. The second, driven by
//! [`Partial::ready`], resolves every reference, decodes the properties
//! against the resolved table and hydrates the shell.
//!
//! References are answered from the kernel's location index before the
//! loader is asked. Shells register there before their hydration starts, so
//! creations that reference each other never wait on each other.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use jig_codec::{decode, Container, CreationKind, CreationRef, FnResolver, Value};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::config::VerifyPolicy;
use crate::error::{KernelError, Result};
use crate::hash::hash_state_offloaded;
use crate::hydrate::Hydration;
use crate::kernel::{Kernel, KernelEvent};
use crate::loader::Loader;
use crate::location::Location;
use crate::state::CachedState;

/// A shell whose hydration may still be running.
#[derive(Clone)]
pub struct Partial {
    creation: CreationRef,
    location: Location,
    ready: Shared<BoxFuture<'static, Result<CreationRef>>>,
}

impl Partial {
    /// A partial whose hydration has already finished.
    pub(crate) fn settled(creation: CreationRef, location: Location) -> Self {
        Self {
            creation,
            location,
            ready: futures::future::ready(Ok(creation)).boxed().shared(),
        }
    }

    /// The shell. Identity is final even before hydration completes.
    pub fn creation(&self) -> CreationRef {
        self.creation
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Wait for hydration. Every waiter sees the same outcome.
    pub async fn ready(&self) -> Result<CreationRef> {
        self.ready.clone().await
    }
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("creation", &self.creation)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Recreate the creation stored at `location`.
    ///
    /// Concurrent calls for one location share a single partial. A call that
    /// fails before the shell exists leaves nothing behind, so it may be
    /// retried.
    pub async fn recreate(
        &self,
        location: &Location,
        state: CachedState,
        expected_hash: Option<&str>,
        loader: Arc<dyn Loader>,
    ) -> Result<Partial> {
        let cell = Arc::clone(&self.inner.by_location.entry(location.to_string()).or_default());
        let partial = cell
            .get_or_try_init(|| self.begin(location, state, expected_hash, loader))
            .await?;
        Ok(partial.clone())
    }

    /// Recreate a set of states keyed by location. All shells exist before
    /// any hydration runs.
    pub async fn recreate_graph_from_states(
        &self,
        states: BTreeMap<String, CachedState>,
        loader: Arc<dyn Loader>,
    ) -> Result<BTreeMap<String, CreationRef>> {
        let mut partials = Vec::with_capacity(states.len());
        for (key, state) in states {
            let location = Location::parse(&key)?;
            let partial = self.recreate(&location, state, None, loader.clone()).await?;
            partials.push((key, partial));
        }
        debug!(count = partials.len(), "Shells created for graph");

        let ready = try_join_all(partials.iter().map(|(_, partial)| partial.ready())).await?;
        Ok(partials.into_iter().map(|(key, _)| key).zip(ready).collect())
    }

    // =========================================================================
    // Phase 1
    // =========================================================================

    async fn begin(
        &self,
        location: &Location,
        state: CachedState,
        expected_hash: Option<&str>,
        loader: Arc<dyn Loader>,
    ) -> Result<Partial> {
        if !self.inner.config.supports(&state.version) {
            return Err(KernelError::UnsupportedVersion(state.version));
        }
        let kind = state.creation_kind()?;
        if !location.is_absolute() {
            return Err(KernelError::InvalidLocation(location.to_string()));
        }
        if (kind == CreationKind::Berry) != location.is_berry() {
            return Err(KernelError::InvalidLocation(format!("{location} cannot hold a {kind}")));
        }

        let location = self.verify(kind, location, &state, expected_hash).await?;
        let txid = location
            .txid()
            .ok_or_else(|| KernelError::InvalidLocation(location.to_string()))?
            .to_string();
        let references = collect_references(&state, &txid)?;

        if kind == CreationKind::Code {
            let origin = code_origin(&state, &location, &txid)?;
            if !self.inner.trust.trusted(&origin, "load").await {
                return Err(KernelError::Trust(origin));
            }
        }

        let creation = self.create_shell(kind);
        if let Some(slot) = self.slot(&creation) {
            slot.set_location(location.clone());
        }
        debug!(location = %location, creation = %creation, references = references.len(), "Recreating");

        let kernel = self.clone();
        let at = location.clone();
        let ready = async move { kernel.complete(creation, at, state, references, loader).await }
            .boxed()
            .shared();
        Ok(Partial {
            creation,
            location,
            ready,
        })
    }

    /// Check the state hash. Berries are always hashed and the result is
    /// stamped onto their location.
    async fn verify(
        &self,
        kind: CreationKind,
        location: &Location,
        state: &CachedState,
        expected_hash: Option<&str>,
    ) -> Result<Location> {
        let check = kind == CreationKind::Berry
            || (expected_hash.is_some() && self.inner.config.verify == VerifyPolicy::Always);
        if !check {
            return Ok(location.clone());
        }

        let actual = hash_state_offloaded(state.clone()).await?;
        if let Some(expected) = expected_hash.or_else(|| location.hash()) {
            if expected != actual {
                warn!(location = %location, expected, actual = %actual, "Hash mismatch");
                return Err(KernelError::HashMismatch {
                    location: location.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(location.with_hash(actual))
    }

    // =========================================================================
    // Phase 2
    // =========================================================================

    async fn complete(
        &self,
        creation: CreationRef,
        location: Location,
        state: CachedState,
        references: Vec<Location>,
        loader: Arc<dyn Loader>,
    ) -> Result<CreationRef> {
        let result = self
            .hydrate_from_state(creation, &location, &state, &references, loader.as_ref())
            .await;
        match &result {
            Ok(()) => {
                info!(location = %location, creation = %creation, "Creation loaded");
                self.emit(KernelEvent::Loaded {
                    creation,
                    location: location.to_string(),
                });
            }
            Err(err) => {
                let reason = err.to_string();
                if let Some(slot) = self.slot(&creation) {
                    slot.fail(&reason);
                }
                warn!(location = %location, creation = %creation, error = %err, "Hydration failed");
                self.emit(KernelEvent::Failed {
                    location: location.to_string(),
                    reason,
                });
            }
        }
        result.map(|()| creation)
    }

    async fn hydrate_from_state(
        &self,
        creation: CreationRef,
        location: &Location,
        state: &CachedState,
        references: &[Location],
        loader: &dyn Loader,
    ) -> Result<()> {
        let resolved = try_join_all(
            references
                .iter()
                .map(|reference| self.resolve_reference(reference, loader)),
        )
        .await?;
        let table: HashMap<String, CreationRef> = references
            .iter()
            .map(Location::to_string)
            .zip(resolved)
            .collect();

        let txid = location
            .txid()
            .ok_or_else(|| KernelError::InvalidLocation(location.to_string()))?;
        let resolver = FnResolver::new(
            |_: &CreationRef| None,
            |id: &Json| {
                let key = reference_location(id, txid).ok()?.to_string();
                table.get(&key).copied()
            },
        );

        let obj = match decode(&state.props, Some(&resolver))? {
            Value::Object(obj) => obj,
            other => {
                return Err(KernelError::InvalidState(format!(
                    "props must be an object, found {}",
                    other.type_name()
                )))
            }
        };
        let contents = obj.read().clone();
        let props = match contents {
            Container::Object(props) => props,
            other => {
                return Err(KernelError::InvalidState(format!(
                    "props must be a plain object, found {}",
                    other.type_name()
                )))
            }
        };
        let cls = match &state.cls {
            None => None,
            Some(cls) => match decode(cls, Some(&resolver))? {
                Value::Creation(code) if code.kind() == CreationKind::Code => Some(code),
                other => {
                    return Err(KernelError::InvalidState(format!(
                        "class must be code, found {}",
                        other.type_name()
                    )))
                }
            },
        };

        self.hydrate(
            creation,
            Hydration {
                location: location.clone(),
                cls,
                src: state.src.clone(),
                props,
            },
        )
    }

    async fn resolve_reference(&self, location: &Location, loader: &dyn Loader) -> Result<CreationRef> {
        if let Some(partial) = self.partial(location) {
            return Ok(partial.creation());
        }
        debug!(location = %location, "Loading reference");
        loader
            .load(self, location)
            .await?
            .ok_or_else(|| KernelError::MissingReference(location.to_string()))
    }
}

/// Absolute or built-in location named by a `$jig` identifier.
fn reference_location(id: &Json, txid: &str) -> Result<Location> {
    let raw = id
        .as_str()
        .ok_or_else(|| KernelError::InvalidLocation(id.to_string()))?;
    let location = Location::parse(raw)?.resolve(txid);
    if !location.is_absolute() && !location.is_native() {
        return Err(KernelError::InvalidLocation(raw.to_string()));
    }
    Ok(location)
}

/// Decode once with placeholder creations, collecting every referenced
/// location in first-seen order.
fn collect_references(state: &CachedState, txid: &str) -> Result<Vec<Location>> {
    let found = RefCell::new(Vec::<Location>::new());
    let failure = RefCell::new(None::<KernelError>);
    let resolver = FnResolver::new(
        |_: &CreationRef| None,
        |id: &Json| match reference_location(id, txid) {
            Ok(location) => {
                let mut found = found.borrow_mut();
                if !found.contains(&location) {
                    found.push(location);
                }
                Some(CreationRef::placeholder(CreationKind::Code))
            }
            Err(err) => {
                failure.borrow_mut().get_or_insert(err);
                None
            }
        },
    );

    let decoded = decode(&state.props, Some(&resolver)).and_then(|_| match &state.cls {
        Some(cls) => decode(cls, Some(&resolver)).map(|_| ()),
        None => Ok(()),
    });
    drop(resolver);
    if let Some(err) = failure.into_inner() {
        return Err(err);
    }
    decoded?;
    Ok(found.into_inner())
}

/// Origin of code for the trust check: the declared origin if any, else
/// where the code is being loaded from.
fn code_origin(state: &CachedState, location: &Location, txid: &str) -> Result<String> {
    let declared = state
        .props
        .get("origin")
        .and_then(Json::as_str)
        .map(|origin| Location::parse(origin).map(|origin| origin.resolve(txid).to_string()));
    match declared {
        Some(origin) => origin,
        None => Ok(location.to_string()),
    }
}
