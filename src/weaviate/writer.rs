//! Persisting chunk records.

use crate::pipeline::Chunk;
use crate::weaviate::{WeaviateError, WeaviateService, payload::build_properties};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Storage operations on chunk records.
#[async_trait]
pub trait ChunkWriter: Send + Sync {
    /// Insert or overwrite the record for `chunk`, returning its object id.
    async fn store(&self, chunk: &Chunk) -> Result<Uuid, WeaviateError>;

    /// Remove every record that came from `source_url`, returning how many were deleted.
    async fn delete_by_source_url(&self, source_url: &str) -> Result<u64, WeaviateError>;
}

/// [`ChunkWriter`] bound to one Weaviate class.
pub struct WeaviateChunkWriter {
    service: Arc<WeaviateService>,
    class: String,
}

impl WeaviateChunkWriter {
    /// Write into `class` through `service`.
    pub fn new(service: Arc<WeaviateService>, class: impl Into<String>) -> Self {
        Self {
            service,
            class: class.into(),
        }
    }
}

#[async_trait]
impl ChunkWriter for WeaviateChunkWriter {
    async fn store(&self, chunk: &Chunk) -> Result<Uuid, WeaviateError> {
        let id = chunk.object_id();
        self.service
            .upsert_object(&self.class, id, build_properties(chunk), &chunk.vector)
            .await?;
        Ok(id)
    }

    async fn delete_by_source_url(&self, source_url: &str) -> Result<u64, WeaviateError> {
        let deleted = self
            .service
            .delete_where_equal(&self.class, "source_url", source_url)
            .await?;
        tracing::info!(class = %self.class, source_url, deleted, "Deleted chunks for source");
        Ok(deleted)
    }
}
