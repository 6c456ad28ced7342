use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use tcc_base::{Error, Result};

use crate::registry::Registry;
use crate::store::{Status, Transaction, TransactionStore};

/// Drives a single transaction from hanging toward its terminal state.
/// Returns once the transaction is confirmed/cancelled and the terminal
/// status is submitted, or as soon as a participant call fails.
///
/// Two invocations in sequence are safe by construction: confirm/cancel are
/// an external idempotency contract, and `TXSubmit` refuses to move a
/// transaction out of a persisted terminal state.
pub async fn advance(
    registry: &Registry,
    store: &dyn TransactionStore,
    timeout: Duration,
    tx: &Transaction,
) -> Result<()> {
    let cutoff = SystemTime::now()
        .checked_sub(timeout)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let status = tx.derive_status(cutoff);

    let success = match status {
        Status::Hanging => {
            // Not yet decided; the Monitor will pick this transaction up
            // again on a later tick.
            return Ok(());
        }
        Status::Success => true,
        Status::Failure => false,
    };

    let component_ids = tx.component_ids();
    // A missing participant here is a registry/store invariant violation,
    // not ordinary input validation — `Transaction()` already resolved these
    // same ids against the registry before the transaction was created, so
    // this can only mean the registry changed underneath a still-hanging
    // transaction. Report it as `Internal`, never `UnknownComponent`.
    let participants = registry.lookup(&component_ids).map_err(|e| {
        Error::internal(format!(
            "missing participant during advance of tx {}: {e}",
            tx.tx_id
        ))
    })?;

    for participant in participants {
        let resp = if success {
            participant.confirm(&tx.tx_id).await
        } else {
            participant.cancel(&tx.tx_id).await
        };
        let resp = resp.map_err(|e| {
            warn!(
                tx_id = %tx.tx_id, component = %participant.id(), error = %e,
                "phase 2 participant call failed, advance will retry on next tick"
            );
            e
        })?;
        if !resp.ack {
            let err = Error::internal(format!(
                "component {} rejected {} for tx {}",
                participant.id(),
                if success { "confirm" } else { "cancel" },
                tx.tx_id,
            ));
            return Err(err);
        }
    }

    store.tx_submit(&tx.tx_id, success).await?;
    info!(tx_id = %tx.tx_id, success, "transaction advanced to terminal state");
    Ok(())
}

/// Fan out [`advance`] across every transaction a Monitor scan found
/// hanging. Runs concurrently across transactions; within a single
/// transaction, participant calls stay strictly sequential.
pub async fn advance_all(
    registry: Arc<Registry>,
    store: Arc<dyn TransactionStore>,
    timeout: Duration,
    txs: Vec<Transaction>,
) -> Result<()> {
    let mut handles = Vec::with_capacity(txs.len());
    for tx in txs {
        let registry = registry.clone();
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            advance(&registry, store.as_ref(), timeout, &tx).await
        }));
    }

    let mut first_err = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(join_err) => {
                if first_err.is_none() {
                    first_err = Some(Error::internal(format!("advance task panicked: {join_err}")));
                }
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
