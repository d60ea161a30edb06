//! Origin → location assignments believed consistent.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{KernelError, Result};

/// Every origin maps to at most one location until explicitly reconciled.
#[derive(Debug, Default)]
pub struct Worldview {
    locations: DashMap<String, String>,
}

impl Worldview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `origin` lives at `location`.
    pub fn observe(&self, origin: &str, location: &str) -> Result<()> {
        match self.locations.entry(origin.to_string()) {
            Entry::Occupied(existing) if existing.get() != location => {
                Err(KernelError::InconsistentWorldview {
                    origin: origin.to_string(),
                    existing: existing.get().clone(),
                    claimed: location.to_string(),
                })
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(location.to_string());
                Ok(())
            }
        }
    }

    /// Replace the assignment of `origin`. Returns the previous location.
    pub fn reconcile(&self, origin: &str, location: &str) -> Option<String> {
        let previous = self.locations.insert(origin.to_string(), location.to_string());
        tracing::info!(origin, location, previous = ?previous, "Worldview reconciled");
        previous
    }

    pub fn location_of(&self, origin: &str) -> Option<String> {
        self.locations.get(origin).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
