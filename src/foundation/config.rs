use std::path::Path;

use anyhow::Context;

use crate::foundation::{
    core::Canvas,
    error::{CustomizerError, CustomizerResult},
};

/// Process-wide settings, loaded once at startup and sliced into component options.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CustomizerConfig {
    /// Output canvas every shaped render is produced on.
    pub canvas: Canvas,
    /// Top-level object store prefix holding all session folders.
    pub root_prefix: String,
    /// Base URL the object store serves public objects from.
    pub public_base_url: String,
    /// Orders fetched per ledger query.
    pub ledger_page_size: u32,
    /// Conflict-avoidance candidates tried before settling for the last one.
    pub max_conflict_attempts: u32,
    /// Folders younger than this are never reclaimed without `force`.
    pub grace_days: u32,
    /// Length of the random token in cache-busting query parameters.
    pub cache_bust_token_len: usize,
}

impl Default for CustomizerConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas::DEFAULT,
            root_prefix: "customizer".to_string(),
            public_base_url: "http://localhost/storage/v1/object/public".to_string(),
            ledger_page_size: 250,
            max_conflict_attempts: 100,
            grace_days: 7,
            cache_bust_token_len: 8,
        }
    }
}

impl CustomizerConfig {
    pub fn from_json_path(path: impl AsRef<Path>) -> CustomizerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .map_err(|e| CustomizerError::serde(format!("config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CustomizerResult<()> {
        Canvas::new(self.canvas.width, self.canvas.height)?;
        if self.root_prefix.trim_matches('/').is_empty() {
            return Err(CustomizerError::validation("root_prefix must not be empty"));
        }
        if self.ledger_page_size == 0 {
            return Err(CustomizerError::validation("ledger_page_size must be > 0"));
        }
        if self.max_conflict_attempts == 0 {
            return Err(CustomizerError::validation(
                "max_conflict_attempts must be > 0",
            ));
        }
        if self.cache_bust_token_len == 0 {
            return Err(CustomizerError::validation(
                "cache_bust_token_len must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
