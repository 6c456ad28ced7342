use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A caller-supplied bound on a single `Coordinator::transaction` call: a
/// cancellation signal and an optional deadline, standing in for a context
/// that carries both. Phase 1 derives its working deadline as
/// `min(ctx.deadline, now + Timeout)` and aborts early if `cancellation`
/// fires, in addition to the coordinator's own `Timeout` and shutdown scope.
#[derive(Clone)]
pub struct CallContext {
    pub cancellation: CancellationToken,
    pub deadline: Option<Instant>,
}

impl CallContext {
    /// No caller-imposed deadline or cancellation; phase 1 is still bound by
    /// the coordinator's own `Timeout` and shuts down with it.
    pub fn background() -> Self {
        CallContext {
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CallContext {
            cancellation: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        CallContext {
            cancellation,
            deadline: None,
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        CallContext::background()
    }
}
