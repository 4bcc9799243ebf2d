//! Operator-editable settings: provider selection, credentials, and search tuning.
//!
//! There is exactly one settings row. Reads are never cached at this layer, so a credential
//! written through [`SettingsStore::update`] is visible to the very next provider call.

mod memory;
mod sqlite;

pub use memory::InMemorySettingsStore;
pub use sqlite::SqliteSettingsStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by settings storage backends.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The backing SQLite database failed.
    #[error("settings storage failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Blocking storage task did not complete.
    #[error("settings storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Submitted row violates a field constraint.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// The single settings row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Rerank provider name (`none`, `jina`, `cohere`).
    pub rerank_provider: String,
    /// Credential for the selected rerank provider.
    pub rerank_api_key: String,
    /// Credential for the Gemini embedding API.
    pub gemini_api_key: String,
    /// Keyword/vector blend weight for hybrid search, within `[0, 1]`.
    pub search_alpha: f64,
    /// Number of hits returned by hybrid search.
    pub search_top_k: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rerank_provider: "none".into(),
            rerank_api_key: String::new(),
            gemini_api_key: String::new(),
            search_alpha: 0.5,
            search_top_k: 10,
        }
    }
}

impl Settings {
    /// Check field constraints before the row is persisted.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.search_alpha) {
            return Err(SettingsError::Invalid(format!(
                "search_alpha must be within [0, 1], got {}",
                self.search_alpha
            )));
        }
        if self.search_top_k < 1 {
            return Err(SettingsError::Invalid(format!(
                "search_top_k must be at least 1, got {}",
                self.search_top_k
            )));
        }
        Ok(())
    }
}

/// Single-row settings storage with full-row overwrite semantics.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read the current row.
    async fn get(&self) -> Result<Settings, SettingsError>;

    /// Replace the whole row.
    async fn update(&self, settings: Settings) -> Result<(), SettingsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_reranking() {
        let settings = Settings::default();
        assert_eq!(settings.rerank_provider, "none");
        assert!(settings.gemini_api_key.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_alpha() {
        let settings = Settings {
            search_alpha: 1.5,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_top_k() {
        let settings = Settings {
            search_top_k: 0,
            ..Settings::default()
        };
        let err = settings.validate().expect_err("top_k of zero is invalid");
        assert!(err.to_string().contains("search_top_k"));
    }

    #[test]
    fn update_body_requires_every_field() {
        let partial = serde_json::json!({ "rerank_provider": "jina" });
        assert!(serde_json::from_value::<Settings>(partial).is_err());
    }
}
