//! TCC transaction coordinator core: registry, store contract, two-phase
//! driver, advancer, and monitor loop.

mod advancer;
mod component;
mod context;
mod coordinator;
mod driver;
mod monitor;
mod options;
mod registry;
mod store;

pub use component::{
    ComponentId, Participant, ParticipantResponse, RequestData, RequestEntity, TryRequest, TxId,
};
pub use context::CallContext;
pub use coordinator::Coordinator;
pub use options::Options;
pub use registry::Registry;
pub use store::{ParticipantTry, Status, Transaction, TransactionStore, TryStatus};

pub use tcc_base::{Error, Result};
