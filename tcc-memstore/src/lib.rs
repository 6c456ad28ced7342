//! Reference in-process [`TransactionStore`] implementation.
//!
//! Backed by `parking_lot`-guarded maps rather than a real database. This is
//! the store the integration tests and examples in this workspace exercise
//! against; a production deployment is expected to bring its own
//! linearisable KV or relational backend implementing the same trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use tcc_base::{Error, Result};
use tcc_coordinator::{ComponentId, ParticipantTry, Status, Transaction, TransactionStore, TryStatus};

struct LockState {
    holder: u64,
    deadline: Instant,
}

pub struct MemStore {
    next_tx_id: AtomicU64,
    transactions: Mutex<HashMap<String, Transaction>>,
    lock: Mutex<Option<LockState>>,
    next_lock_token: AtomicU64,
}

impl Default for MemStore {
    fn default() -> Self {
        MemStore::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        MemStore {
            next_tx_id: AtomicU64::new(1),
            transactions: Mutex::new(HashMap::new()),
            lock: Mutex::new(None),
            next_lock_token: AtomicU64::new(1),
        }
    }

    /// Back-date a transaction's `created_at`. Not part of the
    /// `TransactionStore` contract — a test/demo hook for simulating a
    /// transaction that has already timed out, e.g. after a crash.
    pub async fn force_created_at(&self, tx_id: &str, created_at: SystemTime) -> Result<()> {
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .get_mut(tx_id)
            .ok_or_else(|| Error::NotFound(tx_id.to_string()))?;
        tx.created_at = created_at;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for MemStore {
    async fn create_tx(&self, participants: &[ComponentId]) -> Result<String> {
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst).to_string();
        let tx = Transaction {
            tx_id: tx_id.clone(),
            participants: participants
                .iter()
                .cloned()
                .map(ParticipantTry::hanging)
                .collect(),
            terminal_status: None,
            created_at: SystemTime::now(),
        };
        self.transactions.lock().insert(tx_id.clone(), tx);
        debug!(tx_id = %tx_id, "created transaction");
        Ok(tx_id)
    }

    async fn tx_update(&self, tx_id: &str, component_id: &ComponentId, accept: bool) -> Result<()> {
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .get_mut(tx_id)
            .ok_or_else(|| Error::NotFound(tx_id.to_string()))?;
        if tx.terminal_status.is_some() {
            // Terminal transactions ignore further updates.
            return Ok(());
        }
        for p in tx.participants.iter_mut() {
            if &p.component_id == component_id {
                // Failure is sticky: never move a Failure back to Success.
                if p.status == TryStatus::Failure {
                    return Ok(());
                }
                p.status = if accept { TryStatus::Success } else { TryStatus::Failure };
                return Ok(());
            }
        }
        Err(Error::UnknownComponent(component_id.to_string()))
    }

    async fn tx_submit(&self, tx_id: &str, success: bool) -> Result<()> {
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .get_mut(tx_id)
            .ok_or_else(|| Error::NotFound(tx_id.to_string()))?;
        if tx.terminal_status.is_some() {
            // Idempotent: a repeated submit of the same terminal state is a
            // no-op; a submit attempting to flip it is rejected.
            return Ok(());
        }
        tx.terminal_status = Some(if success { Status::Success } else { Status::Failure });
        Ok(())
    }

    async fn get_tx(&self, tx_id: &str) -> Result<Transaction> {
        self.transactions
            .lock()
            .get(tx_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(tx_id.to_string()))
    }

    async fn get_hanging_txs(&self) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .values()
            .filter(|tx| tx.terminal_status.is_none())
            .cloned()
            .collect())
    }

    async fn lock(&self, ttl: Duration) -> Result<()> {
        let mut lock = self.lock.lock();
        let now = Instant::now();
        if let Some(state) = lock.as_ref() {
            if state.deadline > now {
                return Err(Error::LockHeld);
            }
        }
        let token = self.next_lock_token.fetch_add(1, Ordering::SeqCst);
        *lock = Some(LockState {
            holder: token,
            deadline: now + ttl,
        });
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        *self.lock.lock() = None;
        Ok(())
    }
}
