//! End-to-end scenarios driven against the in-process reference store and a
//! scriptable mock participant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tcc_coordinator::{
    CallContext, ComponentId, Coordinator, Error, Options, Participant, ParticipantResponse,
    RequestEntity, Result, TransactionStore, TryRequest,
};
use tcc_memstore::MemStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TryBehavior {
    Ack,
    Reject,
    TransportError,
    Slow(Duration),
}

struct ScriptedParticipant {
    id: ComponentId,
    try_behavior: TryBehavior,
    confirms: AtomicUsize,
    cancels: AtomicUsize,
    seen_tx_ids: Mutex<Vec<String>>,
}

impl ScriptedParticipant {
    fn new(id: &str, try_behavior: TryBehavior) -> Arc<Self> {
        Arc::new(ScriptedParticipant {
            id: ComponentId::new(id),
            try_behavior,
            confirms: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            seen_tx_ids: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn id(&self) -> ComponentId {
        self.id.clone()
    }

    async fn try_reserve(&self, req: TryRequest) -> Result<ParticipantResponse> {
        self.seen_tx_ids.lock().push(req.tx_id.clone());
        match self.try_behavior {
            TryBehavior::Ack => Ok(ParticipantResponse {
                component_id: req.component_id,
                tx_id: req.tx_id,
                ack: true,
            }),
            TryBehavior::Reject => Ok(ParticipantResponse {
                component_id: req.component_id,
                tx_id: req.tx_id,
                ack: false,
            }),
            TryBehavior::TransportError => Err(Error::internal("simulated transport error")),
            TryBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ParticipantResponse {
                    component_id: req.component_id,
                    tx_id: req.tx_id,
                    ack: true,
                })
            }
        }
    }

    async fn confirm(&self, tx_id: &str) -> Result<ParticipantResponse> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        Ok(ParticipantResponse {
            component_id: self.id.clone(),
            tx_id: tx_id.to_string(),
            ack: true,
        })
    }

    async fn cancel(&self, tx_id: &str) -> Result<ParticipantResponse> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(ParticipantResponse {
            component_id: self.id.clone(),
            tx_id: tx_id.to_string(),
            ack: true,
        })
    }
}

async fn wait_for<F: Fn() -> bool>(pred: F) {
    for _ in 0..200 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn happy_path_all_confirm() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());

    let a = ScriptedParticipant::new("a", TryBehavior::Ack);
    let b = ScriptedParticipant::new("b", TryBehavior::Ack);
    let c = ScriptedParticipant::new("c", TryBehavior::Ack);
    coordinator.register(a.clone()).unwrap();
    coordinator.register(b.clone()).unwrap();
    coordinator.register(c.clone()).unwrap();

    let requests = vec![
        RequestEntity::new("a", HashMap::new()),
        RequestEntity::new("b", HashMap::new()),
        RequestEntity::new("c", HashMap::new()),
    ];
    let result = coordinator.transaction(requests, CallContext::background()).await;
    assert_eq!(result.unwrap(), true);

    wait_for(|| {
        a.confirms.load(Ordering::SeqCst) == 1
            && b.confirms.load(Ordering::SeqCst) == 1
            && c.confirms.load(Ordering::SeqCst) == 1
    })
    .await;
    assert_eq!(a.cancels.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_try_rejects_cancels_everyone() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());

    let a = ScriptedParticipant::new("a", TryBehavior::Ack);
    let b = ScriptedParticipant::new("b", TryBehavior::Ack);
    let c = ScriptedParticipant::new("c", TryBehavior::Reject);
    coordinator.register(a.clone()).unwrap();
    coordinator.register(b.clone()).unwrap();
    coordinator.register(c.clone()).unwrap();

    let requests = vec![
        RequestEntity::new("a", HashMap::new()),
        RequestEntity::new("b", HashMap::new()),
        RequestEntity::new("c", HashMap::new()),
    ];
    let err = coordinator.transaction(requests, CallContext::background()).await.unwrap_err();
    match err {
        Error::PhaseOneFailed(id) => assert_eq!(id, "c"),
        other => panic!("unexpected error: {other:?}"),
    }

    wait_for(|| a.cancels.load(Ordering::SeqCst) >= 1 && b.cancels.load(Ordering::SeqCst) >= 1)
        .await;
}

#[tokio::test]
async fn try_transport_error_cancels_everyone() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());

    let a = ScriptedParticipant::new("a", TryBehavior::Ack);
    let b = ScriptedParticipant::new("b", TryBehavior::TransportError);
    coordinator.register(a.clone()).unwrap();
    coordinator.register(b.clone()).unwrap();

    let requests = vec![
        RequestEntity::new("a", HashMap::new()),
        RequestEntity::new("b", HashMap::new()),
    ];
    let err = coordinator.transaction(requests, CallContext::background()).await.unwrap_err();
    match err {
        Error::PhaseOneFailed(id) => assert_eq!(id, "b"),
        other => panic!("unexpected error: {other:?}"),
    }

    wait_for(|| a.cancels.load(Ordering::SeqCst) >= 1).await;
}

#[tokio::test]
async fn empty_batch_rejected_with_no_store_writes() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());

    let err = coordinator.transaction(vec![], CallContext::background()).await.unwrap_err();
    assert!(matches!(err, Error::EmptyBatch));
    assert!(store.get_hanging_txs().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_component_in_request_is_rejected() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());
    let a = ScriptedParticipant::new("a", TryBehavior::Ack);
    coordinator.register(a).unwrap();

    let requests = vec![
        RequestEntity::new("a", HashMap::new()),
        RequestEntity::new("a", HashMap::new()),
    ];
    let err = coordinator.transaction(requests, CallContext::background()).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateRequest(_)));
}

#[tokio::test]
async fn unknown_component_is_rejected() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());

    let requests = vec![RequestEntity::new("ghost", HashMap::new())];
    let err = coordinator.transaction(requests, CallContext::background()).await.unwrap_err();
    assert!(matches!(err, Error::UnknownComponent(_)));
}

#[tokio::test]
async fn caller_cancellation_aborts_a_slow_try() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());

    let a = ScriptedParticipant::new("a", TryBehavior::Ack);
    let b = ScriptedParticipant::new("b", TryBehavior::Slow(Duration::from_secs(10)));
    coordinator.register(a.clone()).unwrap();
    coordinator.register(b.clone()).unwrap();

    let cancellation = tokio_util::sync::CancellationToken::new();
    let ctx = CallContext::with_cancellation(cancellation.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel();
    });

    let requests = vec![
        RequestEntity::new("a", HashMap::new()),
        RequestEntity::new("b", HashMap::new()),
    ];
    let start = tokio::time::Instant::now();
    let err = coordinator.transaction(requests, ctx).await.unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(1));
    match err {
        Error::PhaseOneFailed(id) => assert_eq!(id, "b"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn hanging_all_success_confirms_on_next_advance() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());
    let a = ScriptedParticipant::new("a", TryBehavior::Ack);
    coordinator.register(a.clone()).unwrap();

    // Simulate a coordinator crash between phase 1 recording every try as
    // Success and the Advancer ever running: the transaction is left
    // hanging with no terminal status even though every try succeeded.
    let tx_id = store.create_tx(&[ComponentId::new("a")]).await.unwrap();
    store.tx_update(&tx_id, &ComponentId::new("a"), true).await.unwrap();

    coordinator.advance_now(&tx_id).await.unwrap();

    assert_eq!(a.confirms.load(Ordering::SeqCst), 1);
    assert_eq!(a.cancels.load(Ordering::SeqCst), 0);
    let persisted = store.get_tx(&tx_id).await.unwrap();
    assert_eq!(
        persisted.terminal_status,
        Some(tcc_coordinator::Status::Success)
    );
}

#[tokio::test]
async fn stale_hanging_transaction_times_out_to_cancel() {
    let store = Arc::new(MemStore::new());
    let coordinator = Coordinator::new(store.clone(), Options::default());
    let a = ScriptedParticipant::new("a", TryBehavior::Ack);
    coordinator.register(a.clone()).unwrap();

    // Fabricate a transaction the way a crashed coordinator would have left
    // one: created far enough in the past to have timed out, its only
    // participant still Hanging.
    let tx_id = store.create_tx(&[ComponentId::new("a")]).await.unwrap();
    store
        .force_created_at(&tx_id, std::time::SystemTime::now() - Duration::from_secs(3600))
        .await
        .unwrap();

    coordinator.advance_now(&tx_id).await.unwrap();

    assert_eq!(a.cancels.load(Ordering::SeqCst), 1);
    let persisted = store.get_tx(&tx_id).await.unwrap();
    assert_eq!(
        persisted.terminal_status,
        Some(tcc_coordinator::Status::Failure)
    );
}
