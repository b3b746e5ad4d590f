use crate::{StateError, StateIterator, WorldState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::ops::Bound;

/// A mutation record produced by every write to the world state.
///
/// The host drains these after each committed transaction and appends them to
/// durable storage; replaying them in order reconstructs the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateEvent {
    /// `value` was written under `key`.
    Put { key: String, value: Vec<u8> },
    /// `key` was removed. Carries the removed value.
    Deleted { key: String, value: Vec<u8> },
}

/// In-process world state backed by a `BTreeMap`.
///
/// `BTreeMap<String, _>` orders keys by their UTF-8 bytes, which gives range
/// scans the lexicographic order a ledger state database uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryWorldState {
    entries: BTreeMap<String, Vec<u8>>,
    /// Append-only log of mutations since the last drain.
    #[serde(skip)]
    event_log: Vec<StateEvent>,
}

impl MemoryWorldState {
    /// Create an empty world state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a world state from existing entries without logging events
    /// (used for snapshot restore).
    pub fn with_entries(entries: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            event_log: Vec::new(),
        }
    }

    /// Number of keys present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only access to all entries in key order.
    pub fn entries(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.entries
    }

    /// Drain and return the mutation log.
    pub fn drain_events(&mut self) -> Vec<StateEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the mutation log.
    pub fn events(&self) -> &[StateEvent] {
        &self.event_log
    }

    /// Apply a logged mutation without re-logging it.
    pub fn apply(&mut self, event: &StateEvent) {
        match event {
            StateEvent::Put { key, value } => {
                self.entries.insert(key.clone(), value.clone());
            }
            StateEvent::Deleted { key, .. } => {
                self.entries.remove(key);
            }
        }
    }

    /// Reconstruct a world state from a sequence of events.
    pub fn replay(events: &[StateEvent]) -> Self {
        let mut state = Self::new();
        for event in events {
            state.apply(event);
        }
        state
    }

    /// Deterministic FNV-1a hash of the contents in key order.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        for (key, value) in &self.entries {
            mix(&mut h, &(key.len() as u64).to_le_bytes());
            mix(&mut h, key.as_bytes());
            mix(&mut h, &(value.len() as u64).to_le_bytes());
            mix(&mut h, value);
        }
        h
    }
}

impl WorldState for MemoryWorldState {
    type Scan<'a> = MemoryScan<'a>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        if key.is_empty() {
            return Err(StateError::EmptyKey);
        }
        tracing::debug!(key, len = value.len(), "put");
        self.entries.insert(key.to_string(), value.clone());
        self.event_log.push(StateEvent::Put {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StateError> {
        if let Some(value) = self.entries.remove(key) {
            tracing::debug!(key, "delete");
            self.event_log.push(StateEvent::Deleted {
                key: key.to_string(),
                value,
            });
        }
        Ok(())
    }

    fn range_scan(&self, start: &str, end: &str) -> Result<MemoryScan<'_>, StateError> {
        if !start.is_empty() && !end.is_empty() && start > end {
            return Err(StateError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start)
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        Ok(MemoryScan {
            inner: Some(self.entries.range::<str, _>((lower, upper))),
        })
    }
}

/// Range-scan cursor over a [`MemoryWorldState`].
pub struct MemoryScan<'a> {
    inner: Option<btree_map::Range<'a, String, Vec<u8>>>,
}

impl Iterator for MemoryScan<'_> {
    type Item = Result<(String, Vec<u8>), StateError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.inner.as_mut()?.next()?;
        Some(Ok((key.clone(), value.clone())))
    }
}

impl StateIterator for MemoryScan<'_> {
    fn close(&mut self) -> Result<(), StateError> {
        self.inner = None;
        Ok(())
    }
}
