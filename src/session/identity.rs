//! Decides which folder an upload is stored under.
//!
//! Resolution walks `CheckOrderConflict -> CheckExistingFolder -> Resolved`:
//!
//! - If the order ledger already holds an order for `(session, product)`, a new session id
//!   is derived (`<base>_<4 time digits><random>`) and re-checked until one is free or the
//!   attempt bound runs out, in which case the last candidate is used anyway.
//! - Without a conflict the target folder is listed purely to explain whether it will be
//!   reused or created; writes behave the same either way.
//! - A failing ledger never blocks an upload: the requested id is kept and the reason says why.

use std::fmt;

use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};

use crate::{
    foundation::{
        backend::Backend,
        config::CustomizerConfig,
        core::{MAX_ID_LEN, validate_product_id, validate_session_id},
        error::CustomizerResult,
    },
    ledger::orders::{OrderLedger, OrderQuery},
    storage::gateway::{FolderKey, SessionStore},
};

const RANDOM_SUFFIX_LEN: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolverOpts {
    pub page_size: u32,
    pub max_attempts: u32,
}

impl Default for ResolverOpts {
    fn default() -> Self {
        Self {
            page_size: 250,
            max_attempts: 100,
        }
    }
}

impl From<&CustomizerConfig> for ResolverOpts {
    fn from(cfg: &CustomizerConfig) -> Self {
        Self {
            page_size: cfg.ledger_page_size,
            max_attempts: cfg.max_conflict_attempts,
        }
    }
}

/// How the final session id was arrived at.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// No conflict, folder did not exist yet.
    Fresh,
    /// No conflict, folder exists and its contents will be replaced.
    ReusedExisting,
    /// Conflict found; a free id was found after `attempts` candidates.
    ConflictResolved { attempts: u32 },
    /// Conflict found; no free id within the bound, last candidate used.
    ConflictExhausted { attempts: u32 },
    /// Ledger could not be queried; requested id kept.
    LedgerUnavailable { error: String },
}

impl fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => f.write_str("fresh folder: no existing assets for this session"),
            Self::ReusedExisting => {
                f.write_str("reused existing folder: previous assets will be replaced")
            }
            Self::ConflictResolved { attempts } => write!(
                f,
                "conflict resolved: session id already used by an order, new id found after {attempts} attempt(s)"
            ),
            Self::ConflictExhausted { attempts } => write!(
                f,
                "conflict unresolved: no free session id after {attempts} attempts, using last candidate"
            ),
            Self::LedgerUnavailable { error } => write!(
                f,
                "order ledger unavailable ({error}); keeping requested session id"
            ),
        }
    }
}

/// Storage identity for one upload cycle.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionIdentity {
    pub base_session_id: String,
    pub product_id: String,
    pub final_session_id: String,
    pub changed: bool,
    pub reason: String,
    pub outcome: ResolutionOutcome,
}

impl SessionIdentity {
    fn new(base: &str, product: &str, final_id: String, outcome: ResolutionOutcome) -> Self {
        Self {
            base_session_id: base.to_string(),
            product_id: product.to_string(),
            changed: final_id != base,
            final_session_id: final_id,
            reason: outcome.to_string(),
            outcome,
        }
    }

    pub fn folder(&self) -> CustomizerResult<FolderKey> {
        FolderKey::session_product(&self.final_session_id, &self.product_id)
    }
}

enum ConflictCheck {
    Clear,
    Conflict,
}

pub struct IdentityResolver {
    ledger: Backend<dyn OrderLedger>,
    store: SessionStore,
    opts: ResolverOpts,
}

impl IdentityResolver {
    pub fn new(ledger: Backend<dyn OrderLedger>, store: SessionStore, opts: ResolverOpts) -> Self {
        Self {
            ledger,
            store,
            opts,
        }
    }

    /// Resolve the final storage identity for `(base_session_id, product_id)`.
    ///
    /// Only input validation and store failures surface as errors; ledger failures are
    /// absorbed into [`ResolutionOutcome::LedgerUnavailable`].
    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        base_session_id: &str,
        product_id: &str,
    ) -> CustomizerResult<SessionIdentity> {
        validate_session_id(base_session_id)?;
        validate_product_id(product_id)?;

        let identity = match self.check_conflict(base_session_id, product_id).await {
            Err(error) => {
                tracing::warn!(%error, "order ledger check failed; keeping requested session id");
                SessionIdentity::new(
                    base_session_id,
                    product_id,
                    base_session_id.to_string(),
                    ResolutionOutcome::LedgerUnavailable {
                        error: error.to_string(),
                    },
                )
            }
            Ok(ConflictCheck::Conflict) => {
                let (final_id, outcome) = self.find_free_candidate(base_session_id, product_id).await;
                SessionIdentity::new(base_session_id, product_id, final_id, outcome)
            }
            Ok(ConflictCheck::Clear) => {
                let folder = FolderKey::session_product(base_session_id, product_id)?;
                let outcome = if self.store.folder_has_assets(&folder).await? {
                    ResolutionOutcome::ReusedExisting
                } else {
                    ResolutionOutcome::Fresh
                };
                SessionIdentity::new(
                    base_session_id,
                    product_id,
                    base_session_id.to_string(),
                    outcome,
                )
            }
        };

        tracing::info!(
            final_session_id = %identity.final_session_id,
            changed = identity.changed,
            reason = %identity.reason,
            "session identity resolved"
        );
        Ok(identity)
    }

    async fn check_conflict(
        &self,
        session_id: &str,
        product_id: &str,
    ) -> CustomizerResult<ConflictCheck> {
        let ledger = self.ledger.get()?;
        let query = OrderQuery::any(self.opts.page_size);
        if ledger.has_reference(session_id, product_id, query).await? {
            Ok(ConflictCheck::Conflict)
        } else {
            Ok(ConflictCheck::Clear)
        }
    }

    /// Never returns `base` itself: every candidate carries a suffix.
    async fn find_free_candidate(&self, base: &str, product_id: &str) -> (String, ResolutionOutcome) {
        let max = self.opts.max_attempts.max(1);
        let mut candidate = candidate_id(base);
        for attempt in 1..=max {
            match self.check_conflict(&candidate, product_id).await {
                Ok(ConflictCheck::Clear) => {
                    return (
                        candidate,
                        ResolutionOutcome::ConflictResolved { attempts: attempt },
                    );
                }
                Ok(ConflictCheck::Conflict) => {
                    tracing::debug!(%candidate, attempt, "candidate session id also conflicts");
                }
                Err(error) => {
                    // Candidate is already distinct from the conflicting id.
                    tracing::warn!(%error, %candidate, "ledger failed while re-checking candidate");
                    return (
                        candidate,
                        ResolutionOutcome::ConflictResolved { attempts: attempt },
                    );
                }
            }
            if attempt < max {
                candidate = candidate_id(base);
            }
        }
        tracing::warn!(%candidate, attempts = max, "conflict attempts exhausted");
        (
            candidate,
            ResolutionOutcome::ConflictExhausted { attempts: max },
        )
    }
}

/// `<base>_<last 4 digits of epoch millis><6 random alphanumerics>`, with `base`
/// shortened if needed so the result is still a valid session id.
pub fn candidate_id(base: &str) -> String {
    let base = &base[..base.len().min(MAX_ID_LEN - 5 - RANDOM_SUFFIX_LEN)];
    let time_suffix = Utc::now().timestamp_millis().rem_euclid(10_000);
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{base}_{time_suffix:04}{random}")
}

#[cfg(test)]
#[path = "../../tests/unit/session/identity.rs"]
mod tests;
