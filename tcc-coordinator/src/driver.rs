use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tcc_base::{Error, Result};

use crate::component::{ComponentId, RequestEntity, TryRequest, TxId};
use crate::context::CallContext;
use crate::registry::Registry;
use crate::store::TransactionStore;

/// Outcome of phase 1 for a transaction that was successfully created in the
/// store. `result` is `Ok(())` iff every participant's try ack'd; otherwise
/// it names the first participant that didn't.
pub struct PhaseOneOutcome {
    pub tx_id: TxId,
    pub result: Result<()>,
}

/// Resolves components, creates the transaction record, and fans try out to
/// every participant concurrently.
pub struct TwoPhaseDriver {
    registry: Arc<Registry>,
    store: Arc<dyn TransactionStore>,
    timeout: Duration,
}

impl TwoPhaseDriver {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn TransactionStore>, timeout: Duration) -> Self {
        TwoPhaseDriver {
            registry,
            store,
            timeout,
        }
    }

    /// Runs phase 1 for a bundle of requests bound to `scope`'s cancellation
    /// (the coordinator's own root, so `Stop()` unwinds in-flight tries) and
    /// to `ctx` (the caller's own deadline/cancellation). The working
    /// deadline is `min(ctx.deadline, now + Timeout)`; `ctx.cancellation`
    /// aborts a try early the same way an internal early-abort does.
    /// Validation errors (`EmptyBatch`, `DuplicateRequest`,
    /// `UnknownComponent`, `StoreUnavailable`) are returned directly since no
    /// transaction exists yet to recover. Once a transaction is created,
    /// every subsequent failure is reported through the returned
    /// [`PhaseOneOutcome`] instead, since the transaction must still be
    /// handed to the Advancer.
    pub async fn run(
        &self,
        requests: Vec<RequestEntity>,
        scope: CancellationToken,
        ctx: &CallContext,
    ) -> Result<PhaseOneOutcome> {
        if requests.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut seen = HashSet::with_capacity(requests.len());
        for req in &requests {
            if !seen.insert(req.component_id.clone()) {
                return Err(Error::DuplicateRequest(req.component_id.to_string()));
            }
        }

        let component_ids: Vec<ComponentId> =
            requests.iter().map(|r| r.component_id.clone()).collect();
        let participants = self.registry.lookup(&component_ids)?;

        let tx_id = self
            .store
            .create_tx(&component_ids)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        info!(tx_id = %tx_id, participants = component_ids.len(), "phase 1 starting");

        let phase_token = scope.child_token();
        let driver_deadline = Instant::now() + self.timeout;
        let deadline = match ctx.deadline {
            Some(d) if d < driver_deadline => d,
            _ => driver_deadline,
        };
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<(ComponentId, bool)>();
        let total = participants.len();

        for (participant, req) in participants.into_iter().zip(requests.into_iter()) {
            let tx_id = tx_id.clone();
            let token = phase_token.clone();
            let caller_cancel = ctx.cancellation.clone();
            let store = self.store.clone();
            let results_tx = results_tx.clone();
            tokio::spawn(async move {
                let component_id = participant.id();
                let try_req = TryRequest {
                    component_id: component_id.clone(),
                    tx_id: tx_id.clone(),
                    data: req.data,
                };
                // `accept` only ever reads the response ack on the path
                // where the call actually returned one; a transport error
                // or cancellation is unconditionally a rejection.
                let accept = tokio::select! {
                    _ = token.cancelled() => false,
                    _ = caller_cancel.cancelled() => false,
                    res = tokio::time::timeout_at(deadline, participant.try_reserve(try_req)) => {
                        matches!(res, Ok(Ok(resp)) if resp.ack)
                    }
                };
                if let Err(err) = store.tx_update(&tx_id, &component_id, accept).await {
                    warn!(
                        tx_id = %tx_id, component = %component_id, error = %err,
                        "tx update failed, recovery will retry"
                    );
                }
                let _ = results_tx.send((component_id, accept));
            });
        }
        drop(results_tx);

        let mut first_failure: Option<ComponentId> = None;
        let mut received = 0;
        while received < total {
            match results_rx.recv().await {
                Some((component_id, accept)) => {
                    received += 1;
                    if !accept && first_failure.is_none() {
                        first_failure = Some(component_id);
                        // Cancel the shared scope so peer tries can abort
                        // promptly, then stop waiting on siblings: they
                        // still record their own outcomes best-effort.
                        phase_token.cancel();
                        break;
                    }
                }
                None => break,
            }
        }

        let result = match first_failure {
            Some(id) => {
                warn!(tx_id = %tx_id, component = %id, "phase 1 try failed");
                Err(Error::PhaseOneFailed(id.to_string()))
            }
            None => Ok(()),
        };

        Ok(PhaseOneOutcome { tx_id, result })
    }
}
