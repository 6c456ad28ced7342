use tracing::error;

/// Error kinds surfaced by the coordinator core.
///
/// Every variant that is part of the documented contract is matchable by
/// callers; `Other` wraps anything that bubbled up from a store or
/// participant implementation we don't otherwise have a name for.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request batch is empty")]
    EmptyBatch,

    #[error("duplicate component id in request: {0}")]
    DuplicateRequest(String),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("component already registered: {0}")]
    DuplicateComponent(String),

    #[error("transaction store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("phase one failed, first failing component: {0}")]
    PhaseOneFailed(String),

    #[error("advisory lock is held by another coordinator")]
    LockHeld,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build an [`Error::Other`] from any boxable error, logging it at the
    /// point of creation the way the rest of this workspace logs on the way
    /// out of a fallible call.
    pub fn other<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        error!(target: "tcc", "{:?}", err);
        Error::Other(Box::new(err))
    }

    pub fn internal(msg: impl Into<String>) -> Error {
        let msg = msg.into();
        error!(target: "tcc", "{}", msg);
        Error::Internal(msg)
    }
}
