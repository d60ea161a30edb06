//! Loading referenced creations, and the state store behind the cache loader.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use jig_codec::CreationRef;
use tokio::sync::RwLock;

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::location::Location;
use crate::state::CachedState;

/// Resolves a location to a creation during hydration.
///
/// Implementations must not wait on a creation that is already being
/// recreated; the kernel answers those from its own location index before
/// asking the loader.
#[async_trait]
pub trait Loader: Send + Sync {
    /// `Ok(None)` when the location is unknown.
    async fn load(&self, kernel: &Kernel, location: &Location) -> Result<Option<CreationRef>>;
}

/// Key-value store of cached states.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedState>>;

    async fn put(&self, key: &str, state: CachedState) -> Result<()>;
}

const JIG_KEY: &str = "jig://";
const BERRY_KEY: &str = "berry://";

/// Store key for the state at `location`: `berry://<loc>` or `jig://<loc>`.
pub fn state_key(location: &Location) -> String {
    if location.is_berry() {
        format!("{BERRY_KEY}{location}")
    } else {
        format!("{JIG_KEY}{location}")
    }
}

/// Whether `key` has the form [`state_key`] produces.
fn is_state_key(key: &str) -> bool {
    let location = match (key.strip_prefix(JIG_KEY), key.strip_prefix(BERRY_KEY)) {
        (Some(location), _) => Location::parse(location).ok().filter(|l| !l.is_berry()),
        (_, Some(location)) => Location::parse(location).ok().filter(Location::is_berry),
        _ => None,
    };
    location.is_some_and(|location| location.is_absolute())
}

/// In-memory state store.
#[derive(Default)]
pub struct MemoryStateStore {
    states: Arc<RwLock<HashMap<String, CachedState>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` under the key for `location`.
    pub async fn insert(&self, location: &Location, state: CachedState) {
        self.states.write().await.insert(state_key(location), state);
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<CachedState>> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, state: CachedState) -> Result<()> {
        if !is_state_key(key) {
            return Err(KernelError::Store(format!("not a state key: {key}")));
        }
        self.states.write().await.insert(key.to_string(), state);
        Ok(())
    }
}

/// Loader that recreates creations from cached states.
pub struct CacheLoader {
    store: Arc<dyn StateStore>,
    me: Weak<CacheLoader>,
}

impl CacheLoader {
    pub fn new(store: Arc<dyn StateStore>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            store,
            me: me.clone(),
        })
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn handle(&self) -> Result<Arc<dyn Loader>> {
        let me: Arc<dyn Loader> = self
            .me
            .upgrade()
            .ok_or_else(|| KernelError::Internal("cache loader dropped".to_string()))?;
        Ok(me)
    }
}

#[async_trait]
impl Loader for CacheLoader {
    async fn load(&self, kernel: &Kernel, location: &Location) -> Result<Option<CreationRef>> {
        let key = state_key(location);
        let Some(state) = self.store.get(&key).await? else {
            tracing::debug!(key = %key, "No cached state");
            return Ok(None);
        };
        let partial = kernel.recreate(location, state, None, self.handle()?).await?;
        partial.ready().await.map(Some)
    }
}
