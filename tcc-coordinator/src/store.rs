use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tcc_base::Result;

use crate::component::{ComponentId, TxId};

/// Per-participant try outcome. Transitions only `Hanging -> Success` or
/// `Hanging -> Failure`, never reverse, never `Success <-> Failure`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TryStatus {
    Hanging,
    Success,
    Failure,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTry {
    pub component_id: ComponentId,
    pub status: TryStatus,
}

impl ParticipantTry {
    pub fn hanging(component_id: ComponentId) -> Self {
        ParticipantTry {
            component_id,
            status: TryStatus::Hanging,
        }
    }
}

/// Transaction status. `Hanging` is derived, not assigned, until `TXSubmit`
/// runs; after that it is terminal and immutable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Status {
    Hanging,
    Success,
    Failure,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: TxId,
    pub participants: Vec<ParticipantTry>,
    /// `None` until `TXSubmit` has persisted a terminal status.
    pub terminal_status: Option<Status>,
    pub created_at: SystemTime,
}

impl Transaction {
    /// Derivation rule, given a cutoff time `now - Timeout`: timed out ->
    /// Failure; any try failed -> Failure; any try not yet succeeded ->
    /// Hanging; else Success. A persisted terminal status always wins over
    /// derivation.
    pub fn derive_status(&self, cutoff: SystemTime) -> Status {
        if let Some(status) = self.terminal_status {
            return status;
        }
        if self.created_at < cutoff {
            return Status::Failure;
        }
        if self
            .participants
            .iter()
            .any(|p| p.status == TryStatus::Failure)
        {
            return Status::Failure;
        }
        if self
            .participants
            .iter()
            .any(|p| p.status != TryStatus::Success)
        {
            return Status::Hanging;
        }
        Status::Success
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.participants
            .iter()
            .map(|p| p.component_id.clone())
            .collect()
    }
}

/// Durable transaction log + coarse advisory lock, consumed by the driver,
/// advancer, and monitor. Implementations must give `TXUpdate` failure-sticky
/// semantics and `TXSubmit` a terminal-state guard.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Allocate a globally unique tx id and persist a Hanging transaction
    /// with every participant Hanging. Durable before returning.
    async fn create_tx(&self, participants: &[ComponentId]) -> Result<TxId>;

    /// Set one participant's try-state. Idempotent under identical
    /// arguments; on conflicting updates, Failure is sticky.
    async fn tx_update(&self, tx_id: &str, component_id: &ComponentId, accept: bool)
        -> Result<()>;

    /// Persist a terminal status. Idempotent; must reject transitions away
    /// from an already-persisted terminal state.
    async fn tx_submit(&self, tx_id: &str, success: bool) -> Result<()>;

    /// Current snapshot, or `Error::NotFound`.
    async fn get_tx(&self, tx_id: &str) -> Result<Transaction>;

    /// All transactions with no persisted terminal status yet.
    async fn get_hanging_txs(&self) -> Result<Vec<Transaction>>;

    /// Acquire the advisory lock with a TTL fence. Fails with
    /// `Error::LockHeld` rather than blocking.
    async fn lock(&self, ttl: Duration) -> Result<()>;

    /// Release the advisory lock. Idempotent.
    async fn unlock(&self) -> Result<()>;
}
