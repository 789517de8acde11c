use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    foundation::error::{CustomizerError, CustomizerResult},
    ledger::orders::{Order, OrderLedger, OrderQuery},
};

/// Order ledger read from a JSON array of orders, re-read on every query.
#[derive(Clone, Debug)]
pub struct JsonFileOrderLedger {
    path: PathBuf,
}

impl JsonFileOrderLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OrderLedger for JsonFileOrderLedger {
    async fn list_orders(&self, query: OrderQuery) -> CustomizerResult<Vec<Order>> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            CustomizerError::ledger(format!("read ledger '{}': {e}", self.path.display()))
        })?;
        let orders: Vec<Order> = serde_json::from_slice(&raw).map_err(|e| {
            CustomizerError::serde(format!("parse ledger '{}': {e}", self.path.display()))
        })?;
        Ok(orders
            .into_iter()
            .filter(|o| query.status.matches(&o.status))
            .take(query.page_size as usize)
            .collect())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ledger/file.rs"]
mod tests;
