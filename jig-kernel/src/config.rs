//! Configuration for the kernel.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::STATE_VERSION;

/// When cached state hashes are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    /// Verify every state that comes with an expected hash
    #[default]
    Always,
    /// Verify berries only; code and jigs are taken as given
    BerriesOnly,
}

/// Kernel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// State format versions accepted by `recreate`
    pub supported_versions: Vec<String>,
    /// Hash verification policy
    pub verify: VerifyPolicy,
    /// Initial trust entries: origins, txids, or `*`
    pub trust: Vec<String>,
    /// Capacity of the kernel event channel
    pub event_capacity: usize,
    /// Upper bound on `Kernel::load` (milliseconds)
    pub load_timeout_ms: Option<u64>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            supported_versions: vec![STATE_VERSION.to_string()],
            verify: VerifyPolicy::Always,
            trust: Vec::new(),
            event_capacity: 256,
            load_timeout_ms: None,
        }
    }
}

impl KernelConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Builder: trust the given origin, txid, or `*`.
    pub fn trusting(mut self, entry: impl Into<String>) -> Self {
        self.trust.push(entry.into());
        self
    }

    pub fn supports(&self, version: &str) -> bool {
        self.supported_versions.iter().any(|v| v == version)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}
