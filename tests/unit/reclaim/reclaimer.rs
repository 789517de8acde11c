use async_trait::async_trait;

use super::*;
use crate::{
    ledger::{
        memory::{MemoryCustomizationRecords, MemoryOrderLedger},
        orders::{Order, OrderProperty},
    },
    storage::{
        gateway::{EMPTY_FOLDER_PLACEHOLDER, ObjectStore},
        memory::MemoryObjectStore,
    },
};

fn order(session: &str) -> Order {
    Order {
        id: "5001".to_string(),
        status: "open".to_string(),
        properties: vec![
            OrderProperty::new("session_id", session),
            OrderProperty::new("product_id", "P1"),
        ],
    }
}

async fn seed(mem: &MemoryObjectStore, folder: &str, age_days: i64, now: DateTime<Utc>) {
    let at = now - TimeDelta::days(age_days);
    mem.insert_at(
        &format!("customizer/{folder}/original.png"),
        vec![1],
        "image/png",
        at,
    )
    .await;
    mem.insert_at(
        &format!("customizer/{folder}/circle_{}.png", at.timestamp_millis()),
        vec![2],
        "image/png",
        at,
    )
    .await;
}

fn reclaimer(mem: Arc<MemoryObjectStore>, ledger: Arc<MemoryOrderLedger>) -> Reclaimer {
    let ledger: Arc<dyn OrderLedger> = ledger;
    Reclaimer::new(
        SessionStore::ready(mem, "customizer"),
        Backend::ready(ledger),
        250,
    )
}

async fn folders(mem: &MemoryObjectStore) -> Vec<String> {
    let mut out: Vec<String> = mem
        .paths()
        .await
        .iter()
        .filter_map(|p| p.split('/').nth(1).map(str::to_string))
        .collect();
    out.dedup();
    out
}

/// Memory store whose removals fail for one folder.
struct FailingRemoves {
    inner: Arc<MemoryObjectStore>,
    poisoned: String,
}

#[async_trait]
impl ObjectStore for FailingRemoves {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> CustomizerResult<()> {
        self.inner.put(path, bytes, content_type).await
    }

    async fn put_new(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> CustomizerResult<bool> {
        self.inner.put_new(path, bytes, content_type).await
    }

    async fn list(&self, prefix: &str) -> CustomizerResult<Vec<ObjectEntry>> {
        self.inner.list(prefix).await
    }

    async fn get(&self, path: &str) -> CustomizerResult<Vec<u8>> {
        self.inner.get(path).await
    }

    async fn remove(&self, paths: &[String]) -> CustomizerResult<()> {
        if paths.iter().any(|p| p.contains(&self.poisoned)) {
            return Err(CustomizerError::storage("permission denied"));
        }
        self.inner.remove(paths).await
    }

    fn public_url(&self, path: &str) -> String {
        self.inner.public_url(path)
    }
}

#[tokio::test]
async fn grace_period_protects_recent_folders() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "fresh-P1", 1, now).await;
    seed(&mem, "edge-P1", 6, now).await;
    seed(&mem, "stale-P1", 10, now).await;

    let r = reclaimer(mem.clone(), Arc::new(MemoryOrderLedger::default()));
    let report = r
        .cleanup_orphaned_sessions_at(ReclaimOpts::default(), now)
        .await
        .unwrap();

    assert_eq!(report.deleted_folders, vec!["stale-P1".to_string()]);
    assert_eq!(report.skipped_folders, vec!["edge-P1".to_string(), "fresh-P1".to_string()]);
    assert!(report.is_clean());
    assert_eq!(folders(&mem).await, vec!["edge-P1".to_string(), "fresh-P1".to_string()]);
}

#[tokio::test]
async fn newest_file_decides_folder_age() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "mixed-P1", 30, now).await;
    mem.insert_at("customizer/mixed-P1/heart_1.png", vec![3], "image/png", now)
        .await;

    let r = reclaimer(mem.clone(), Arc::new(MemoryOrderLedger::default()));
    let report = r
        .cleanup_orphaned_sessions_at(ReclaimOpts::default(), now)
        .await
        .unwrap();
    assert!(report.deleted_folders.is_empty());
    assert_eq!(report.skipped_folders, vec!["mixed-P1".to_string()]);
}

#[tokio::test]
async fn referenced_stale_folders_are_kept() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "sess_2-P1", 30, now).await;
    seed(&mem, "sess_3-P1", 30, now).await;

    let ledger = Arc::new(MemoryOrderLedger::with_orders(vec![order("sess_2")]));
    let report = reclaimer(mem.clone(), ledger)
        .cleanup_orphaned_sessions_at(ReclaimOpts::default(), now)
        .await
        .unwrap();
    assert_eq!(report.deleted_folders, vec!["sess_3-P1".to_string()]);
    assert_eq!(report.skipped_folders, vec!["sess_2-P1".to_string()]);
}

#[tokio::test]
async fn force_deletes_everything_without_asking_the_ledger() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "sess_2-P1", 0, now).await;
    seed(&mem, "sess_3-P1", 40, now).await;

    let ledger = Arc::new(MemoryOrderLedger::with_orders(vec![order("sess_2")]));
    ledger.set_outage(Some("down")).await;
    let report = reclaimer(mem.clone(), ledger.clone())
        .cleanup_orphaned_sessions_at(
            ReclaimOpts {
                grace_days: 7,
                force: true,
            },
            now,
        )
        .await
        .unwrap();

    assert_eq!(report.deleted_folders.len(), 2);
    assert!(report.skipped_folders.is_empty());
    assert!(mem.paths().await.is_empty());
    assert_eq!(ledger.query_count(), 0);
}

#[tokio::test]
async fn empty_folders_are_deleted_regardless_of_age() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    mem.insert_at(
        &format!("customizer/sess_2-P1/{EMPTY_FOLDER_PLACEHOLDER}"),
        vec![],
        "text/plain",
        now,
    )
    .await;

    let ledger = Arc::new(MemoryOrderLedger::with_orders(vec![order("sess_2")]));
    let report = reclaimer(mem.clone(), ledger)
        .cleanup_orphaned_sessions_at(ReclaimOpts::default(), now)
        .await
        .unwrap();
    assert_eq!(report.deleted_folders, vec!["sess_2-P1".to_string()]);
    assert!(mem.paths().await.is_empty());
}

#[tokio::test]
async fn folders_holding_only_nested_prefixes_are_fully_deleted() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    mem.insert_at("customizer/sess_8-P1/thumbs/circle_1.png", vec![1], "image/png", now)
        .await;

    let report = reclaimer(mem.clone(), Arc::new(MemoryOrderLedger::default()))
        .cleanup_orphaned_sessions_at(ReclaimOpts::default(), now)
        .await
        .unwrap();
    assert_eq!(report.deleted_folders, vec!["sess_8-P1".to_string()]);
    assert!(mem.paths().await.is_empty());
}

#[tokio::test]
async fn unreferenced_sessions_are_deleted_regardless_of_age() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "sess_2-P1", 0, now).await;
    seed(&mem, "sess_3-P1", 0, now).await;

    let ledger = Arc::new(MemoryOrderLedger::with_orders(vec![order("sess_2")]));
    let report = reclaimer(mem.clone(), ledger)
        .delete_sessions_not_in_orders(false)
        .await
        .unwrap();

    assert_eq!(report.deleted_folders, vec!["sess_3-P1".to_string()]);
    assert_eq!(report.skipped_folders, vec!["sess_2-P1".to_string()]);
    assert_eq!(folders(&mem).await, vec!["sess_2-P1".to_string()]);
}

#[tokio::test]
async fn deletion_cascades_to_records_best_effort() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "sess_3-P1", 0, now).await;
    seed(&mem, "sess_4-P1", 0, now).await;
    mem.insert_at("variants/r1.png", vec![7], "image/png", now).await;

    let records = Arc::new(MemoryCustomizationRecords::with_records(vec![
        CustomizationRecord {
            id: "r1".to_string(),
            session_id: "sess_3".to_string(),
            product_id: "P1".to_string(),
            asset_paths: vec!["variants/r1.png".to_string()],
        },
        CustomizationRecord {
            id: "r2".to_string(),
            session_id: "sess_4".to_string(),
            product_id: "P1".to_string(),
            asset_paths: vec![],
        },
        CustomizationRecord {
            id: "r3".to_string(),
            session_id: "sess_4".to_string(),
            product_id: "P9".to_string(),
            asset_paths: vec![],
        },
    ]));
    records.fail_delete_of("r2").await;

    let r = reclaimer(mem.clone(), Arc::new(MemoryOrderLedger::default()))
        .with_records(records.clone());
    let report = r.delete_sessions_not_in_orders(false).await.unwrap();

    assert_eq!(
        report.deleted_folders,
        vec!["sess_3-P1".to_string(), "sess_4-P1".to_string()]
    );
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].scope, "record:r2");
    // r3 belongs to a folder that was never deleted
    assert_eq!(records.ids().await, vec!["r2".to_string(), "r3".to_string()]);
    assert!(mem.paths().await.is_empty());

    assert!(matches!(
        report.into_result(),
        Err(CustomizerError::PartialReclaimFailure { failed: 1 })
    ));
}

#[tokio::test]
async fn one_failing_folder_does_not_stop_the_batch() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "sess_a-P1", 30, now).await;
    seed(&mem, "sess_b-P1", 30, now).await;
    seed(&mem, "sess_c-P1", 30, now).await;

    let flaky: Arc<dyn ObjectStore> = Arc::new(FailingRemoves {
        inner: mem.clone(),
        poisoned: "sess_b-P1".to_string(),
    });
    let ledger: Arc<dyn OrderLedger> = Arc::new(MemoryOrderLedger::default());
    let r = Reclaimer::new(SessionStore::ready(flaky, "customizer"), Backend::ready(ledger), 250);

    let report = r
        .cleanup_orphaned_sessions_at(ReclaimOpts::default(), now)
        .await
        .unwrap();
    assert_eq!(
        report.deleted_folders,
        vec!["sess_a-P1".to_string(), "sess_c-P1".to_string()]
    );
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].scope, "folder:sess_b-P1");
    assert!(report.errors[0].error.contains("permission denied"));
    assert_eq!(folders(&mem).await, vec!["sess_b-P1".to_string()]);
}

#[tokio::test]
async fn degraded_store_fails_before_any_folder() {
    let ledger = Arc::new(MemoryOrderLedger::default());
    let r = Reclaimer::new(
        SessionStore::new(Backend::degraded("object store", "no credentials"), "customizer", 8),
        Backend::ready(ledger.clone() as Arc<dyn OrderLedger>),
        250,
    );
    assert!(matches!(
        r.cleanup_orphaned_sessions(ReclaimOpts::default()).await,
        Err(CustomizerError::BackendUnavailable(_))
    ));
    assert!(matches!(
        r.delete_sessions_not_in_orders(true).await,
        Err(CustomizerError::BackendUnavailable(_))
    ));
    assert_eq!(ledger.query_count(), 0);
}

#[tokio::test]
async fn unreachable_ledger_fails_the_pass_without_deleting() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "sess_3-P1", 30, now).await;
    let ledger = Arc::new(MemoryOrderLedger::default());
    ledger.set_outage(Some("timeout")).await;

    let r = reclaimer(mem.clone(), ledger);
    assert!(matches!(
        r.cleanup_orphaned_sessions_at(ReclaimOpts::default(), now).await,
        Err(CustomizerError::Ledger(_))
    ));
    assert!(matches!(
        r.delete_sessions_not_in_orders(false).await,
        Err(CustomizerError::Ledger(_))
    ));
    assert_eq!(mem.paths().await.len(), 2);

    let degraded = Reclaimer::new(
        SessionStore::ready(mem.clone(), "customizer"),
        Backend::degraded("order ledger", "missing token"),
        250,
    );
    assert!(matches!(
        degraded.delete_sessions_not_in_orders(false).await,
        Err(CustomizerError::BackendUnavailable(_))
    ));
}

#[test]
fn request_fields_fall_back_to_defaults() {
    let defaults = ReclaimOpts {
        grace_days: 7,
        force: false,
    };
    assert_eq!(ReclaimRequest::default().with_defaults(defaults), defaults);

    let req: ReclaimRequest = serde_json::from_str(r#"{"force": true}"#).unwrap();
    assert_eq!(
        req.with_defaults(defaults),
        ReclaimOpts {
            grace_days: 7,
            force: true
        }
    );
    assert_eq!(
        ReclaimOpts::from(&CustomizerConfig {
            grace_days: 3,
            ..CustomizerConfig::default()
        }),
        ReclaimOpts {
            grace_days: 3,
            force: false
        }
    );
}

#[tokio::test]
async fn huge_grace_period_keeps_everything() {
    let now = Utc::now();
    let mem = Arc::new(MemoryObjectStore::default());
    seed(&mem, "sess_3-P1", 3650, now).await;
    let report = reclaimer(mem, Arc::new(MemoryOrderLedger::default()))
        .cleanup_orphaned_sessions_at(
            ReclaimOpts {
                grace_days: u32::MAX,
                force: false,
            },
            now,
        )
        .await
        .unwrap();
    assert!(report.deleted_folders.is_empty());
    assert_eq!(report.skipped_folders, vec!["sess_3-P1".to_string()]);
}

#[test]
fn clean_report_converts_to_ok() {
    let report = ReclaimReport {
        deleted_folders: vec!["a".to_string()],
        ..ReclaimReport::default()
    };
    assert_eq!(report.clone().into_result().unwrap(), report);
}
