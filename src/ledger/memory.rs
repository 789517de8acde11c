use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    foundation::error::{CustomizerError, CustomizerResult},
    ledger::{
        orders::{Order, OrderLedger, OrderQuery},
        records::{CustomizationRecord, CustomizationRecords},
    },
};

/// In-process order ledger with an injectable outage.
#[derive(Debug, Default)]
pub struct MemoryOrderLedger {
    orders: Mutex<Vec<Order>>,
    outage: Mutex<Option<String>>,
    queries: AtomicUsize,
}

impl MemoryOrderLedger {
    pub fn with_orders(orders: Vec<Order>) -> Self {
        Self {
            orders: Mutex::new(orders),
            ..Self::default()
        }
    }

    pub async fn push(&self, order: Order) {
        self.orders.lock().await.push(order);
    }

    /// Make every subsequent query fail with `reason` (or succeed again with `None`).
    pub async fn set_outage(&self, reason: Option<&str>) {
        *self.outage.lock().await = reason.map(str::to_string);
    }

    /// Number of `list_orders` calls served so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderLedger for MemoryOrderLedger {
    async fn list_orders(&self, query: OrderQuery) -> CustomizerResult<Vec<Order>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.outage.lock().await.clone() {
            return Err(CustomizerError::ledger(reason));
        }
        Ok(self
            .orders
            .lock()
            .await
            .iter()
            .filter(|o| query.status.matches(&o.status))
            .take(query.page_size as usize)
            .cloned()
            .collect())
    }
}

/// In-process customization record registry.
#[derive(Debug, Default)]
pub struct MemoryCustomizationRecords {
    records: Mutex<Vec<CustomizationRecord>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryCustomizationRecords {
    pub fn with_records(records: Vec<CustomizationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub async fn fail_delete_of(&self, record_id: &str) {
        self.failing_deletes
            .lock()
            .await
            .insert(record_id.to_string());
    }

    pub async fn ids(&self) -> Vec<String> {
        self.records
            .lock()
            .await
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }
}

#[async_trait]
impl CustomizationRecords for MemoryCustomizationRecords {
    async fn find_by_session(&self, session_id: &str) -> CustomizerResult<Vec<CustomizationRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, record_id: &str) -> CustomizerResult<()> {
        if self.failing_deletes.lock().await.contains(record_id) {
            return Err(CustomizerError::ledger(format!(
                "delete of record '{record_id}' rejected"
            )));
        }
        self.records.lock().await.retain(|r| r.id != record_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ledger/memory.rs"]
mod tests;
