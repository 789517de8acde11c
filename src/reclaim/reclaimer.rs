//! Storage reclamation for abandoned session folders.
//!
//! Both passes walk the top-level folders under the store root and decide per folder.
//! A failure inside one folder is recorded in the [`ReclaimReport`] and the walk moves on;
//! only an unusable store (or, without `force`, an unreachable ledger) fails the pass up front.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    foundation::{
        backend::Backend,
        config::CustomizerConfig,
        error::{CustomizerError, CustomizerResult},
    },
    ledger::{
        orders::{LedgerSnapshot, OrderLedger, OrderQuery},
        records::{CustomizationRecord, CustomizationRecords},
    },
    storage::gateway::{ObjectEntry, SessionStore, session_segment},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReclaimOpts {
    pub grace_days: u32,
    pub force: bool,
}

impl Default for ReclaimOpts {
    fn default() -> Self {
        Self {
            grace_days: 7,
            force: false,
        }
    }
}

impl From<&CustomizerConfig> for ReclaimOpts {
    fn from(cfg: &CustomizerConfig) -> Self {
        Self {
            grace_days: cfg.grace_days,
            force: false,
        }
    }
}

/// Reclaim input as received from a caller; unset fields fall back to configured defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReclaimRequest {
    #[serde(default)]
    pub grace_days: Option<u32>,
    #[serde(default)]
    pub force: Option<bool>,
}

impl ReclaimRequest {
    pub fn with_defaults(self, defaults: ReclaimOpts) -> ReclaimOpts {
        ReclaimOpts {
            grace_days: self.grace_days.unwrap_or(defaults.grace_days),
            force: self.force.unwrap_or(defaults.force),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReclaimFailure {
    /// `folder:<name>`, `record:<id>` or `records:<session>`.
    pub scope: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReclaimReport {
    pub deleted_folders: Vec<String>,
    pub skipped_folders: Vec<String>,
    pub errors: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    fn fail(&mut self, scope: String, error: &CustomizerError) {
        tracing::warn!(%scope, %error, "reclaim step failed");
        self.errors.push(ReclaimFailure {
            scope,
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn a report with collected failures into [`CustomizerError::PartialReclaimFailure`].
    pub fn into_result(self) -> CustomizerResult<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(CustomizerError::PartialReclaimFailure {
                failed: self.errors.len(),
            })
        }
    }
}

enum Verdict {
    Delete(&'static str),
    Keep(&'static str),
}

fn folder_scope(folder: &str) -> String {
    format!("folder:{folder}")
}

pub struct Reclaimer {
    store: SessionStore,
    ledger: Backend<dyn OrderLedger>,
    records: Option<Arc<dyn CustomizationRecords>>,
    page_size: u32,
}

impl Reclaimer {
    pub fn new(store: SessionStore, ledger: Backend<dyn OrderLedger>, page_size: u32) -> Self {
        Self {
            store,
            ledger,
            records: None,
            page_size: page_size.max(1),
        }
    }

    /// Registry whose entries are deleted along with their session folders.
    pub fn with_records(mut self, records: Arc<dyn CustomizationRecords>) -> Self {
        self.records = Some(records);
        self
    }

    async fn snapshot(&self) -> CustomizerResult<LedgerSnapshot> {
        let ledger = self.ledger.get()?;
        let snapshot = LedgerSnapshot::fetch(ledger.as_ref(), OrderQuery::any(self.page_size)).await?;
        tracing::debug!(orders = snapshot.len(), "ledger snapshot fetched");
        Ok(snapshot)
    }

    /// Delete empty folders, and folders past the grace period that no order mentions.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_orphaned_sessions(
        &self,
        opts: ReclaimOpts,
    ) -> CustomizerResult<ReclaimReport> {
        self.cleanup_orphaned_sessions_at(opts, Utc::now()).await
    }

    /// [`Self::cleanup_orphaned_sessions`] with an explicit clock.
    pub async fn cleanup_orphaned_sessions_at(
        &self,
        opts: ReclaimOpts,
        now: DateTime<Utc>,
    ) -> CustomizerResult<ReclaimReport> {
        self.store.ensure_available()?;
        let snapshot = if opts.force {
            None
        } else {
            Some(self.snapshot().await?)
        };
        let cutoff = TimeDelta::try_days(i64::from(opts.grace_days))
            .and_then(|grace| now.checked_sub_signed(grace))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = ReclaimReport::default();
        for folder in self.store.list_folders().await? {
            let verdict = self
                .judge_by_age(&folder, opts.force, cutoff, snapshot.as_ref())
                .await;
            match verdict {
                Ok(Verdict::Delete(why)) => {
                    if let Err(e) = self.delete_folder(&folder, why, &mut report).await {
                        report.fail(folder_scope(&folder), &e);
                    }
                }
                Ok(Verdict::Keep(why)) => {
                    tracing::debug!(%folder, why, "folder kept");
                    report.skipped_folders.push(folder);
                }
                Err(e) => report.fail(folder_scope(&folder), &e),
            }
        }

        tracing::info!(
            deleted = report.deleted_folders.len(),
            skipped = report.skipped_folders.len(),
            failed = report.errors.len(),
            "orphaned session cleanup finished"
        );
        Ok(report)
    }

    async fn judge_by_age(
        &self,
        folder: &str,
        force: bool,
        cutoff: DateTime<Utc>,
        snapshot: Option<&LedgerSnapshot>,
    ) -> CustomizerResult<Verdict> {
        let entries = self.store.list_folder_entries(folder).await?;
        if entries.iter().all(ObjectEntry::is_placeholder) {
            return Ok(Verdict::Delete("empty"));
        }
        if force {
            return Ok(Verdict::Delete("forced"));
        }

        let newest = entries
            .iter()
            .filter(|e| !e.is_placeholder())
            .filter_map(|e| e.last_modified)
            .max();
        Ok(match newest {
            // Without any timestamp the folder's age is unknown; treat it as active.
            None => Verdict::Keep("no modification time"),
            Some(t) if t > cutoff => Verdict::Keep("within grace period"),
            Some(_) if snapshot.is_none_or(|s| s.mentions(session_segment(folder))) => {
                Verdict::Keep("referenced by an order")
            }
            Some(_) => Verdict::Delete("expired and unreferenced"),
        })
    }

    /// Delete every folder whose session no order mentions, regardless of age, and cascade
    /// to the customization records of the deleted folders.
    #[tracing::instrument(skip(self))]
    pub async fn delete_sessions_not_in_orders(
        &self,
        force: bool,
    ) -> CustomizerResult<ReclaimReport> {
        self.store.ensure_available()?;
        let snapshot = if force {
            None
        } else {
            Some(self.snapshot().await?)
        };

        let mut report = ReclaimReport::default();
        for folder in self.store.list_folders().await? {
            let session = session_segment(&folder).to_string();
            if snapshot.as_ref().is_some_and(|s| s.mentions(&session)) {
                tracing::debug!(%folder, "folder referenced by an order");
                report.skipped_folders.push(folder);
                continue;
            }

            let why = if force { "forced" } else { "unreferenced" };
            match self.delete_folder(&folder, why, &mut report).await {
                Ok(()) => self.cascade_records(&folder, &session, &mut report).await,
                Err(e) => report.fail(folder_scope(&folder), &e),
            }
        }

        tracing::info!(
            deleted = report.deleted_folders.len(),
            skipped = report.skipped_folders.len(),
            failed = report.errors.len(),
            "unordered session cleanup finished"
        );
        Ok(report)
    }

    async fn delete_folder(
        &self,
        folder: &str,
        why: &'static str,
        report: &mut ReclaimReport,
    ) -> CustomizerResult<()> {
        let removed = self.store.remove_folder(folder).await?;
        tracing::info!(%folder, removed, why, "folder deleted");
        report.deleted_folders.push(folder.to_string());
        Ok(())
    }

    /// Best-effort: failures are recorded per record and never stop the walk.
    async fn cascade_records(&self, folder: &str, session: &str, report: &mut ReclaimReport) {
        let Some(records) = &self.records else {
            return;
        };
        let found = match records.find_by_session(session).await {
            Ok(found) => found,
            Err(e) => {
                report.fail(format!("records:{session}"), &e);
                return;
            }
        };

        for record in found.into_iter().filter(|r| owns_folder(r, folder)) {
            let result = async {
                self.store.remove_paths(&record.asset_paths).await?;
                records.delete(&record.id).await
            }
            .await;
            match result {
                Ok(()) => tracing::info!(record = %record.id, %folder, "customization record deleted"),
                Err(e) => report.fail(format!("record:{}", record.id), &e),
            }
        }
    }
}

/// A record belongs to its `<session>-<product>` folder and to the bare session folder.
fn owns_folder(record: &CustomizationRecord, folder: &str) -> bool {
    folder == record.session_id || folder == format!("{}-{}", record.session_id, record.product_id)
}

#[cfg(test)]
#[path = "../../tests/unit/reclaim/reclaimer.rs"]
mod tests;
