use shiptrack_common::TxId;
use shiptrack_state::WorldState;

/// Handle to the world state session of one transaction.
///
/// Passed explicitly to every registry operation.
pub struct TxContext<'s, S: WorldState> {
    tx_id: TxId,
    state: &'s mut S,
}

impl<'s, S: WorldState> TxContext<'s, S> {
    /// Open a context under a fresh transaction id.
    pub fn new(state: &'s mut S) -> Self {
        Self::with_tx_id(TxId::new(), state)
    }

    /// Open a context under a transaction id assigned by the host.
    pub fn with_tx_id(tx_id: TxId, state: &'s mut S) -> Self {
        Self { tx_id, state }
    }

    /// The transaction this context belongs to.
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Read access to the world state.
    pub fn state(&self) -> &S {
        &*self.state
    }

    /// Write access to the world state.
    pub fn state_mut(&mut self) -> &mut S {
        &mut *self.state
    }
}
