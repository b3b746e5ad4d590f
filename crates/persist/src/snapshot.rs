use serde::{Deserialize, Serialize};
use shiptrack_state::MemoryWorldState;
use std::collections::BTreeMap;

/// A content-addressed copy of the world state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of mutation log segments already folded into `entries`.
    pub segments_applied: u32,
    /// Every key and value, in key order.
    pub entries: BTreeMap<String, Vec<u8>>,
    /// [`MemoryWorldState::state_hash`] of `entries` at capture time.
    pub hash: u64,
}

impl Snapshot {
    /// Capture the current contents of `state`.
    pub fn capture(state: &MemoryWorldState, segments_applied: u32) -> Self {
        Self {
            segments_applied,
            entries: state.entries().clone(),
            hash: state.state_hash(),
        }
    }

    /// Recompute the content hash and compare.
    pub fn verify(&self) -> bool {
        self.restore().state_hash() == self.hash
    }

    /// Rebuild a world state from this snapshot. The result has an empty
    /// mutation log.
    pub fn restore(&self) -> MemoryWorldState {
        MemoryWorldState::with_entries(
            self.entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        )
    }
}
