//! Persistence for the host harness: world state snapshots plus an
//! append-only mutation log, with a hash-chained integrity manifest.
//!
//! # Invariants
//! - The mutation log is append-only; a segment holds one committed transaction.
//! - Every file written is recorded in the manifest and verified on load.
//! - Loading reconstructs state from the latest snapshot plus the segments
//!   written after it.

pub mod snapshot;
pub mod store;

pub use snapshot::Snapshot;
pub use store::{StateMeta, StateStore, StoreError};
