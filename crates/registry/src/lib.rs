//! Asset registry: uniquely-identified shipment records kept in a world state.
//!
//! # Invariants
//! - At most one stored record per asset id; the id is the world state key.
//! - Create refuses an existing id; update, delete and transfer refuse a
//!   missing one.
//! - The registry holds no state between operations. Each call reaches the
//!   world state only through the [`TxContext`] it is given.

pub mod context;
pub mod registry;

pub use context::TxContext;
pub use registry::{AssetRegistry, seed_assets};

use shiptrack_common::CodecError;
use shiptrack_state::StateError;

/// Failures surfaced by registry operations.
///
/// Nothing is retried or compensated locally; the host is expected to abort
/// the enclosing transaction on any of these.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("asset {0} already exists")]
    Conflict(String),
    #[error("asset {0} does not exist")]
    NotFound(String),
    #[error("asset encoding error: {0}")]
    Encoding(#[from] CodecError),
    #[error("failed to access world state: {0}")]
    Storage(#[from] StateError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
