use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tcc_base::Error;

use crate::advancer::advance_all;
use crate::registry::Registry;
use crate::store::TransactionStore;

/// Exponential backoff ceiling: the tick interval never grows past
/// `8 * base`.
const BACKOFF_CEILING_MULTIPLIER: u32 = 8;

/// Runs the periodic scan-and-advance loop until `shutdown` fires.
///
/// Each tick attempts the advisory lock; `LockHeld` is steady-state in a
/// multi-coordinator deployment and never triggers backoff. Any other error
/// doubles the next tick interval, capped at `8 * MonitorTick`; a clean scan
/// resets it to the base interval.
pub async fn run(
    registry: Arc<Registry>,
    store: Arc<dyn TransactionStore>,
    timeout: Duration,
    monitor_tick: Duration,
    shutdown: CancellationToken,
) {
    let mut tick = monitor_tick;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("monitor loop stopping");
                return;
            }
            _ = tokio::time::sleep(tick) => {}
        }

        match scan_once(&registry, &store, timeout).await {
            ScanOutcome::LockContended | ScanOutcome::Clean => {
                tick = monitor_tick;
            }
            ScanOutcome::Error => {
                let ceiling = monitor_tick * BACKOFF_CEILING_MULTIPLIER;
                tick = (tick * 2).min(ceiling);
            }
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
enum ScanOutcome {
    LockContended,
    Clean,
    Error,
}

async fn scan_once(
    registry: &Arc<Registry>,
    store: &Arc<dyn TransactionStore>,
    timeout: Duration,
) -> ScanOutcome {
    if let Err(err) = store.lock(timeout).await {
        if matches!(err, Error::LockHeld) {
            debug!("advisory lock held elsewhere, skipping this tick");
            return ScanOutcome::LockContended;
        }
        warn!(error = %err, "failed to acquire advisory lock");
        return ScanOutcome::Error;
    }

    let outcome = match store.get_hanging_txs().await {
        Ok(txs) => {
            debug!(count = txs.len(), "advancing hanging transactions");
            match advance_all(registry.clone(), store.clone(), timeout, txs).await {
                Ok(()) => ScanOutcome::Clean,
                Err(err) => {
                    warn!(error = %err, "advance_all reported a failure this tick");
                    ScanOutcome::Error
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to list hanging transactions");
            ScanOutcome::Error
        }
    };

    if let Err(err) = store.unlock().await {
        warn!(error = %err, "failed to release advisory lock");
    }

    outcome
}
