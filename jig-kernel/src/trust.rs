//! Trust decisions for loading code.

use async_trait::async_trait;
use dashmap::DashSet;

use crate::location::Location;

/// Entry that trusts every origin.
pub const TRUST_ALL: &str = "*";

/// Decides whether code from an origin may be loaded.
#[async_trait]
pub trait Trust: Send + Sync {
    /// `context` names the operation asking, e.g. `"load"`.
    async fn trusted(&self, origin: &str, context: &str) -> bool;
}

/// Trust list of exact origins, whole transactions, or [`TRUST_ALL`].
#[derive(Debug, Default)]
pub struct TrustList {
    entries: DashSet<String>,
}

impl TrustList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = Self::new();
        for entry in entries {
            list.trust(entry);
        }
        list
    }

    pub fn trust(&self, entry: impl Into<String>) {
        self.entries.insert(entry.into());
    }

    pub fn untrust(&self, entry: &str) -> bool {
        self.entries.remove(entry).is_some()
    }

    pub fn is_trusted(&self, origin: &str) -> bool {
        if self.entries.contains(TRUST_ALL) || self.entries.contains(origin) {
            return true;
        }
        Location::parse(origin)
            .ok()
            .and_then(|location| location.txid().map(|txid| self.entries.contains(txid)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Trust for TrustList {
    async fn trusted(&self, origin: &str, context: &str) -> bool {
        let trusted = self.is_trusted(origin);
        if !trusted {
            tracing::debug!(origin, context, "Origin not on trust list");
        }
        trusted
    }
}
