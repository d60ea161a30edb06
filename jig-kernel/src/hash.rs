//! Content hashes over canonical state JSON.

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::state::CachedState;

/// Lowercase hex SHA-256, the form berry locations carry.
pub fn compute_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Hash of a state record. Keys are sorted at every level, so equal states
/// hash equally however they were built.
pub fn hash_state(state: &CachedState) -> Result<String> {
    let canonical = serde_json::to_string(&serde_json::to_value(state)?)?;
    Ok(compute_hash(canonical.as_bytes()))
}

/// [`hash_state`] on the blocking pool.
pub async fn hash_state_offloaded(state: CachedState) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_state(&state)).await?
}
