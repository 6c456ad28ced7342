use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tcc_base::Result;

use crate::advancer::advance;
use crate::component::{Participant, RequestEntity};
use crate::context::CallContext;
use crate::driver::TwoPhaseDriver;
use crate::monitor;
use crate::options::Options;
use crate::registry::Registry;
use crate::store::TransactionStore;

/// The coordinator: registry, store, driver, and the background monitor
/// loop, wired together.
pub struct Coordinator {
    registry: Arc<Registry>,
    store: Arc<dyn TransactionStore>,
    driver: TwoPhaseDriver,
    options: Options,
    root_token: CancellationToken,
    monitor_handle: JoinHandle<()>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn TransactionStore>, options: Options) -> Self {
        let registry = Arc::new(Registry::new());
        let driver = TwoPhaseDriver::new(registry.clone(), store.clone(), options.timeout);
        let root_token = CancellationToken::new();

        let monitor_handle = tokio::spawn(monitor::run(
            registry.clone(),
            store.clone(),
            options.timeout,
            options.monitor_tick,
            root_token.child_token(),
        ));

        Coordinator {
            registry,
            store,
            driver,
            options,
            root_token,
            monitor_handle,
        }
    }

    /// Register a participant. Errors with `Error::DuplicateComponent` if
    /// its id is already present.
    pub fn register(&self, participant: Arc<dyn Participant>) -> Result<()> {
        self.registry.register(participant)
    }

    /// Drives `requests` through phase 1 and hands off to the Advancer.
    /// `ctx` bounds this call specifically: phase 1 runs to
    /// `min(ctx.deadline, now + Timeout)` and aborts early if
    /// `ctx.cancellation` fires, on top of the coordinator's own `Timeout`
    /// and shutdown scope. Use [`CallContext::background`] for a call with
    /// no caller-imposed bound beyond the coordinator's own `Timeout`.
    ///
    /// `Ok(true)` means phase 1 succeeded and the transaction's commit is
    /// durable — it will converge to commit even across restarts. An `Err`
    /// naming a component means phase 1 failed for that component and the
    /// transaction will converge to abort; the transaction is already
    /// persisted and handed to the Advancer either way, so phase-2
    /// completion is observable only through the store, never from this
    /// call's return value.
    pub async fn transaction(&self, requests: Vec<RequestEntity>, ctx: CallContext) -> Result<bool> {
        let outcome = self
            .driver
            .run(requests, self.root_token.child_token(), &ctx)
            .await?;

        self.schedule_advance(outcome.tx_id.clone());

        outcome.result.map(|()| true)
    }

    /// Schedules an asynchronous Advancer run for a transaction id,
    /// independent of the caller's lifetime — a crash between this and the
    /// advance completing is recovered by the next Monitor scan.
    fn schedule_advance(&self, tx_id: String) {
        let registry = self.registry.clone();
        let store = self.store.clone();
        let timeout = self.options.timeout;
        tokio::spawn(async move {
            if let Err(err) = advance_by_id(&registry, store.as_ref(), timeout, &tx_id).await {
                tracing::warn!(tx_id = %tx_id, error = %err, "advance failed, Monitor will retry");
            }
        });
    }

    /// Loads a transaction by id and runs the Advancer on it synchronously.
    /// Exposed for operators and recovery tooling that want to nudge a
    /// specific transaction rather than waiting for the next Monitor tick;
    /// the Monitor itself calls `advance_all` directly rather than this.
    pub async fn advance_now(&self, tx_id: &str) -> Result<()> {
        advance_by_id(&self.registry, self.store.as_ref(), self.options.timeout, tx_id).await
    }

    /// Cancels the root context: the Monitor and any in-flight phase-1 calls
    /// wind down cooperatively.
    pub fn stop(&self) {
        info!("coordinator stopping");
        self.root_token.cancel();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.root_token.cancel();
        self.monitor_handle.abort();
    }
}

async fn advance_by_id(
    registry: &Registry,
    store: &dyn TransactionStore,
    timeout: std::time::Duration,
    tx_id: &str,
) -> Result<()> {
    let tx = store.get_tx(tx_id).await?;
    advance(registry, store, timeout, &tx).await
}
