use async_trait::async_trait;

use crate::foundation::error::{CustomizerError, CustomizerResult};

pub const SESSION_ID_PROPERTY: &str = "session_id";
pub const PRODUCT_ID_PROPERTY: &str = "product_id";

/// Line-item property attached to an order.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderProperty {
    pub name: String,
    pub value: String,
}

impl OrderProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub properties: Vec<OrderProperty>,
}

impl Order {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// `true` when this order carries both the session and the product identity.
    pub fn references(&self, session_id: &str, product_id: &str) -> bool {
        self.property(SESSION_ID_PROPERTY) == Some(session_id)
            && self.property(PRODUCT_ID_PROPERTY) == Some(product_id)
    }

    /// Substring match over the serialized order. Over-broad on purpose: any
    /// occurrence anywhere counts as a reference.
    pub fn mentions(&self, needle: &str) -> bool {
        match serde_json::to_string(self) {
            Ok(json) => json.contains(needle),
            // Unserializable orders are treated as referencing everything.
            Err(_) => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Any,
    Open,
    Closed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Any => "any",
            OrderStatus::Open => "open",
            OrderStatus::Closed => "closed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn matches(self, status: &str) -> bool {
        self == OrderStatus::Any || status.eq_ignore_ascii_case(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderQuery {
    pub page_size: u32,
    pub status: OrderStatus,
}

impl OrderQuery {
    pub fn any(page_size: u32) -> Self {
        Self {
            page_size,
            status: OrderStatus::Any,
        }
    }
}

/// Read-only view of the external order system.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn list_orders(&self, query: OrderQuery) -> CustomizerResult<Vec<Order>>;

    /// `true` if any order in the first page carries both identities.
    async fn has_reference(
        &self,
        session_id: &str,
        product_id: &str,
        query: OrderQuery,
    ) -> CustomizerResult<bool> {
        let orders = self.list_orders(query).await?;
        Ok(orders.iter().any(|o| o.references(session_id, product_id)))
    }
}

/// Orders fetched once for a batch of membership checks.
#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    serialized: Vec<String>,
}

impl LedgerSnapshot {
    pub async fn fetch(ledger: &dyn OrderLedger, query: OrderQuery) -> CustomizerResult<Self> {
        let orders = ledger.list_orders(query).await?;
        Self::from_orders(&orders)
    }

    pub fn from_orders(orders: &[Order]) -> CustomizerResult<Self> {
        let serialized = orders
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CustomizerError::serde(format!("serialize order: {e}")))?;
        Ok(Self { serialized })
    }

    pub fn len(&self) -> usize {
        self.serialized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serialized.is_empty()
    }

    /// `true` if `needle` occurs anywhere in any order.
    pub fn mentions(&self, needle: &str) -> bool {
        !needle.is_empty() && self.serialized.iter().any(|s| s.contains(needle))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ledger/orders.rs"]
mod tests;
