//! Arena of creation slots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use jig_codec::{CreationKind, CreationRef, SlotId};
use jig_membrane::Membrane;

use crate::location::Location;

/// Lifecycle of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// Shell only
    Pending,
    /// Hydrated
    Ready,
    /// Hydration failed or was abandoned; the shell is unusable
    Failed(String),
}

/// One creation: its membrane, where it lives, and how far loading got.
pub struct Slot {
    creation: CreationRef,
    membrane: Membrane,
    location: RwLock<Option<Location>>,
    src: RwLock<Option<String>>,
    status: RwLock<SlotStatus>,
}

impl Slot {
    pub fn creation(&self) -> CreationRef {
        self.creation
    }

    pub fn membrane(&self) -> &Membrane {
        &self.membrane
    }

    pub fn location(&self) -> Option<Location> {
        self.location.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Type source, for code.
    pub fn src(&self) -> Option<String> {
        self.src.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> SlotStatus {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_location(&self, location: Location) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = Some(location);
    }

    /// Move a pending slot to ready. Returns the status that blocked it
    /// otherwise.
    pub(crate) fn set_ready(&self, src: Option<String>) -> Result<(), SlotStatus> {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if *status != SlotStatus::Pending {
            return Err(status.clone());
        }
        *self.src.write().unwrap_or_else(PoisonError::into_inner) = src;
        *status = SlotStatus::Ready;
        Ok(())
    }

    /// Mark failed and poison the membrane. A ready slot stays ready.
    pub(crate) fn fail(&self, reason: &str) -> bool {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if *status == SlotStatus::Ready {
            return false;
        }
        if *status == SlotStatus::Pending {
            *status = SlotStatus::Failed(reason.to_string());
        }
        self.membrane.poison(reason);
        true
    }
}

/// Slots by id. Ids start at 1; 0 is reserved for placeholders.
pub struct Arena {
    slots: DashMap<SlotId, Arc<Slot>>,
    next: AtomicU64,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next: AtomicU64::new(1),
        }
    }

    /// Allocate a slot, building its membrane from the new handle.
    pub fn allocate(&self, kind: CreationKind, membrane: impl FnOnce(CreationRef) -> Membrane) -> Arc<Slot> {
        let id = SlotId(self.next.fetch_add(1, Ordering::SeqCst));
        let creation = CreationRef::new(kind, id);
        let slot = Arc::new(Slot {
            creation,
            membrane: membrane(creation),
            location: RwLock::new(None),
            src: RwLock::new(None),
            status: RwLock::new(SlotStatus::Pending),
        });
        self.slots.insert(id, slot.clone());
        slot
    }

    pub fn get(&self, creation: &CreationRef) -> Option<Arc<Slot>> {
        self.slots
            .get(&creation.slot())
            .map(|slot| slot.value().clone())
            .filter(|slot| slot.creation.kind() == creation.kind())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
