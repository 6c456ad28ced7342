use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tcc_base::Result;

/// Stable opaque identifier for a participant. Assigned by the participant
/// itself, immutable once registered.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        ComponentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        ComponentId(s.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(s: String) -> Self {
        ComponentId(s)
    }
}

/// Opaque transaction identifier, assigned by the store at `CreateTX`.
pub type TxId = String;

/// A free-form payload attached to a single participant's `Try` call.
pub type RequestData = HashMap<String, serde_json::Value>;

/// One participant's try request, as delivered by the driver.
#[derive(Clone, Debug)]
pub struct TryRequest {
    pub component_id: ComponentId,
    pub tx_id: TxId,
    pub data: RequestData,
}

/// The common shape of every participant response.
#[derive(Clone, Debug)]
pub struct ParticipantResponse {
    pub component_id: ComponentId,
    pub tx_id: TxId,
    pub ack: bool,
}

/// One request in a caller-submitted bundle: which component, and what data
/// to hand it in `Try`.
#[derive(Clone, Debug)]
pub struct RequestEntity {
    pub component_id: ComponentId,
    pub data: RequestData,
}

impl RequestEntity {
    pub fn new(component_id: impl Into<ComponentId>, data: RequestData) -> Self {
        RequestEntity {
            component_id: component_id.into(),
            data,
        }
    }
}

/// An external service implementing the three idempotent TCC operations.
///
/// `Confirm` and `Cancel` MUST be idempotent given a `TxId`, and MUST NOT
/// both succeed for the same `TxId` — this is a contract on the participant,
/// not something the coordinator enforces.
#[async_trait]
pub trait Participant: Send + Sync {
    fn id(&self) -> ComponentId;

    async fn try_reserve(&self, req: TryRequest) -> Result<ParticipantResponse>;

    async fn confirm(&self, tx_id: &str) -> Result<ParticipantResponse>;

    async fn cancel(&self, tx_id: &str) -> Result<ParticipantResponse>;
}
