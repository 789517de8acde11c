use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

use super::*;
use crate::{
    foundation::error::CustomizerError,
    ledger::{
        memory::MemoryOrderLedger,
        orders::{Order, OrderProperty},
    },
    storage::{gateway::ObjectStore, memory::MemoryObjectStore},
};

fn order(session: &str, product: &str) -> Order {
    Order {
        id: "9001".to_string(),
        status: "open".to_string(),
        properties: vec![
            OrderProperty::new("session_id", session),
            OrderProperty::new("product_id", product),
        ],
    }
}

fn resolver_with(ledger: Arc<dyn OrderLedger>) -> (Arc<MemoryObjectStore>, IdentityResolver) {
    let mem = Arc::new(MemoryObjectStore::default());
    let store = SessionStore::ready(mem.clone(), "customizer");
    let resolver = IdentityResolver::new(Backend::ready(ledger), store, ResolverOpts::default());
    (mem, resolver)
}

/// Reports every identity as already ordered.
struct AlwaysConflicts {
    calls: AtomicUsize,
}

#[async_trait]
impl OrderLedger for AlwaysConflicts {
    async fn list_orders(&self, _query: OrderQuery) -> CustomizerResult<Vec<Order>> {
        Ok(vec![])
    }

    async fn has_reference(&self, _s: &str, _p: &str, _q: OrderQuery) -> CustomizerResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[tokio::test]
async fn no_conflict_and_no_folder_is_fresh() {
    let (_mem, resolver) = resolver_with(Arc::new(MemoryOrderLedger::default()));
    let id = resolver.resolve("sess_1", "P1").await.unwrap();
    assert_eq!(id.final_session_id, "sess_1");
    assert!(!id.changed);
    assert_eq!(id.outcome, ResolutionOutcome::Fresh);
    assert!(id.reason.starts_with("fresh folder"));
}

#[tokio::test]
async fn no_conflict_with_existing_folder_is_reused() {
    let (mem, resolver) = resolver_with(Arc::new(MemoryOrderLedger::default()));
    mem.put("customizer/sess_1-P1/original.png", vec![1], "image/png")
        .await
        .unwrap();
    let id = resolver.resolve("sess_1", "P1").await.unwrap();
    assert!(!id.changed);
    assert_eq!(id.outcome, ResolutionOutcome::ReusedExisting);
    assert!(id.reason.starts_with("reused existing folder"));
}

#[tokio::test]
async fn conflict_yields_new_id_with_suffixes() {
    let ledger = Arc::new(MemoryOrderLedger::with_orders(vec![order("sess_1", "P1")]));
    let (_mem, resolver) = resolver_with(ledger.clone());

    let id = resolver.resolve("sess_1", "P1").await.unwrap();
    assert!(id.changed);
    assert_ne!(id.final_session_id, "sess_1");
    assert_eq!(id.outcome, ResolutionOutcome::ConflictResolved { attempts: 1 });
    assert!(id.reason.starts_with("conflict resolved"));

    let suffix = id.final_session_id.strip_prefix("sess_1_").unwrap();
    assert_eq!(suffix.len(), 10);
    assert!(suffix[..4].bytes().all(|b| b.is_ascii_digit()));
    assert!(suffix[4..].bytes().all(|b| b.is_ascii_alphanumeric()));
    validate_session_id(&id.final_session_id).unwrap();
    id.folder().unwrap();
    // one query for the base id, one for the candidate
    assert_eq!(ledger.query_count(), 2);
}

#[tokio::test]
async fn conflict_on_other_product_is_not_a_conflict() {
    let ledger = Arc::new(MemoryOrderLedger::with_orders(vec![order("sess_1", "P2")]));
    let (_mem, resolver) = resolver_with(ledger);
    let id = resolver.resolve("sess_1", "P1").await.unwrap();
    assert!(!id.changed);
}

#[tokio::test]
async fn exhausted_attempts_use_last_candidate_and_never_the_base() {
    let ledger = Arc::new(AlwaysConflicts {
        calls: AtomicUsize::new(0),
    });
    let mem = Arc::new(MemoryObjectStore::default());
    let resolver = IdentityResolver::new(
        Backend::ready(ledger.clone() as Arc<dyn OrderLedger>),
        SessionStore::ready(mem, "customizer"),
        ResolverOpts {
            page_size: 250,
            max_attempts: 5,
        },
    );

    let id = resolver.resolve("sess_1", "P1").await.unwrap();
    assert!(id.changed);
    assert!(id.final_session_id.starts_with("sess_1_"));
    assert_eq!(id.outcome, ResolutionOutcome::ConflictExhausted { attempts: 5 });
    assert!(id.reason.contains("after 5 attempts"));
    assert_eq!(ledger.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn ledger_outage_falls_back_to_requested_id() {
    let ledger = Arc::new(MemoryOrderLedger::default());
    ledger.set_outage(Some("connection refused")).await;
    let (_mem, resolver) = resolver_with(ledger);

    let id = resolver.resolve("sess_1", "P1").await.unwrap();
    assert_eq!(id.final_session_id, "sess_1");
    assert!(!id.changed);
    assert!(matches!(id.outcome, ResolutionOutcome::LedgerUnavailable { .. }));
    assert!(id.reason.contains("connection refused"));
}

#[tokio::test]
async fn degraded_ledger_falls_back_too() {
    let mem = Arc::new(MemoryObjectStore::default());
    let resolver = IdentityResolver::new(
        Backend::degraded("order ledger", "missing access token"),
        SessionStore::ready(mem, "customizer"),
        ResolverOpts::default(),
    );
    let id = resolver.resolve("sess_1", "P1").await.unwrap();
    assert!(!id.changed);
    assert!(id.reason.contains("missing access token"));
}

#[tokio::test]
async fn invalid_ids_are_rejected_before_any_lookup() {
    let ledger = Arc::new(MemoryOrderLedger::default());
    let (_mem, resolver) = resolver_with(ledger.clone());
    assert!(matches!(
        resolver.resolve("", "P1").await,
        Err(CustomizerError::Validation(_))
    ));
    assert!(matches!(
        resolver.resolve("sess_1", "").await,
        Err(CustomizerError::Validation(_))
    ));
    assert_eq!(ledger.query_count(), 0);
}

#[test]
fn candidates_stay_valid_for_long_bases() {
    let base = "s".repeat(MAX_ID_LEN);
    let c = candidate_id(&base);
    assert_eq!(c.len(), MAX_ID_LEN);
    validate_session_id(&c).unwrap();
}
