//! World state: the ordered key-value store the registry is expressed against.
//!
//! # Invariants
//! - Keys are non-empty strings; values are opaque bytes.
//! - Range scans yield keys in byte-lexicographic order.
//! - Every scan iterator is closed exactly once, whichever way its consumer exits.

pub mod scan;
pub mod world;

pub use scan::{ScanGuard, StateIterator};
pub use world::{MemoryScan, MemoryWorldState, StateEvent};

/// Errors raised by a world state backend.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("world state key must not be empty")]
    EmptyKey,
    #[error("invalid range: start {start:?} sorts after end {end:?}")]
    InvalidRange { start: String, end: String },
    #[error("world state backend error: {0}")]
    Backend(String),
}

/// An ordered key-value store with no uniqueness or type enforcement of its own.
pub trait WorldState {
    /// Iterator returned by [`WorldState::range_scan`].
    type Scan<'a>: StateIterator
    where
        Self: 'a;

    /// Read the value under `key`. Absence is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError>;

    /// Write `value` under `key`, overwriting unconditionally.
    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StateError>;

    /// Remove `key`. Removing an absent key is a no-op.
    fn delete(&mut self, key: &str) -> Result<(), StateError>;

    /// Scan the half-open interval `[start, end)`. An empty bound is unbounded
    /// on that side, so `range_scan("", "")` visits every key.
    fn range_scan(&self, start: &str, end: &str) -> Result<Self::Scan<'_>, StateError>;
}
