use async_trait::async_trait;

use crate::foundation::error::CustomizerResult;

/// External per-product record created for a customization (e.g. a hidden product variant).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CustomizationRecord {
    pub id: String,
    pub session_id: String,
    pub product_id: String,
    /// Object store paths owned by this record.
    #[serde(default)]
    pub asset_paths: Vec<String>,
}

/// Registry of customization records that reference session folders.
#[async_trait]
pub trait CustomizationRecords: Send + Sync {
    async fn find_by_session(&self, session_id: &str) -> CustomizerResult<Vec<CustomizationRecord>>;

    async fn delete(&self, record_id: &str) -> CustomizerResult<()>;
}
