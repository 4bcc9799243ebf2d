//! Turning one embed-task message into one stored vector.

use crate::metrics::PipelineMetrics;
use crate::pipeline::EmbedTask;
use crate::providers::{Embedder, ProviderError};
use crate::weaviate::{ChunkWriter, WeaviateError};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// How a failed task should be treated by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or unusable credentials/provider selection; visible on the first attempt.
    Configuration,
    /// Network or dependency failure that may succeed on redelivery.
    Transient,
}

/// Failures that should lead to redelivery.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The embedding provider could not produce a vector.
    #[error("embedding failed: {0}")]
    Embedding(#[source] ProviderError),
    /// The vector store refused or failed the write.
    #[error("failed to store chunk: {0}")]
    Store(#[source] WeaviateError),
}

impl PipelineError {
    /// Classify the failure for logging and retry accounting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Embedding(error) if error.is_configuration() => ErrorCategory::Configuration,
            Self::Embedding(_) | Self::Store(_) => ErrorCategory::Transient,
        }
    }
}

/// Successful handling outcomes; both acknowledge the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The chunk was embedded and written under `object_id`.
    Stored {
        /// Deterministic id of the stored object.
        object_id: Uuid,
    },
    /// The payload can never be processed and was dropped.
    Dropped {
        /// Why the payload was rejected.
        reason: String,
    },
}

/// Parses embed tasks, embeds their context, and writes the resulting chunk.
pub struct EmbedTaskConsumer {
    embedder: Arc<dyn Embedder>,
    writer: Arc<dyn ChunkWriter>,
    metrics: Arc<PipelineMetrics>,
}

impl EmbedTaskConsumer {
    /// Wire the consumer to its embedding provider and store.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        writer: Arc<dyn ChunkWriter>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            embedder,
            writer,
            metrics,
        }
    }

    /// Handle one raw message.
    ///
    /// Malformed payloads are dropped and reported as success so they are not redelivered.
    /// Exactly one embed call is made per valid task; the store is only called after it succeeds.
    pub async fn handle_message(&self, body: &[u8]) -> Result<Disposition, PipelineError> {
        let task: EmbedTask = match serde_json::from_slice(body) {
            Ok(task) => task,
            Err(err) => {
                tracing::warn!(error = %err, bytes = body.len(), "Dropping malformed embed task");
                self.metrics.record_dropped();
                return Ok(Disposition::Dropped {
                    reason: err.to_string(),
                });
            }
        };

        let context = task.embedding_context();
        let vector = self
            .embedder
            .embed(&context)
            .await
            .map_err(PipelineError::Embedding)?;

        let source_id = task.source_id.clone();
        let chunk_index = task.chunk_index;
        let correlation_id = task.correlation_id.clone();
        let chunk = task.into_chunk(vector);
        let object_id = self.writer.store(&chunk).await.map_err(PipelineError::Store)?;

        self.metrics.record_stored();
        tracing::info!(
            %object_id,
            source_id = %source_id,
            chunk_index,
            correlation_id = %correlation_id,
            dimension = chunk.vector.len(),
            "Chunk embedded and stored"
        );
        Ok(Disposition::Stored { object_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Chunk;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    struct StubEmbedder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl StubEmbedder {
        fn ok() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(ProviderError::UnexpectedStatus {
                    provider: "gemini",
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "overloaded".into(),
                });
            }
            Ok(vec![0.1, 0.2])
        }
    }

    #[derive(Default)]
    struct StubWriter {
        stored: Mutex<Vec<Chunk>>,
        fail: bool,
    }

    impl StubWriter {
        fn stored(&self) -> Vec<Chunk> {
            self.stored.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChunkWriter for StubWriter {
        async fn store(&self, chunk: &Chunk) -> Result<Uuid, WeaviateError> {
            self.stored.lock().unwrap().push(chunk.clone());
            if self.fail {
                return Err(WeaviateError::Rejected("disk full".into()));
            }
            Ok(chunk.object_id())
        }

        async fn delete_by_source_url(&self, _source_url: &str) -> Result<u64, WeaviateError> {
            Ok(0)
        }
    }

    fn consumer(
        embedder: &Arc<StubEmbedder>,
        writer: &Arc<StubWriter>,
    ) -> (EmbedTaskConsumer, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        (
            EmbedTaskConsumer::new(embedder.clone(), writer.clone(), metrics.clone()),
            metrics,
        )
    }

    const TASK: &str = r#"{
        "source_id": "src1",
        "content": "Chunk Content",
        "title": "Title",
        "author": "John Doe",
        "created_at": "2023-01-01",
        "chunk_index": 0
    }"#;

    #[tokio::test]
    async fn valid_task_is_embedded_and_stored() {
        let embedder = Arc::new(StubEmbedder::ok());
        let writer = Arc::new(StubWriter::default());
        let (consumer, metrics) = consumer(&embedder, &writer);

        let disposition = consumer.handle_message(TASK.as_bytes()).await.expect("handled");

        let calls = embedder.calls();
        assert_eq!(calls.len(), 1);
        let context = &calls[0];
        let positions: Vec<usize> = ["Title: Title", "Author: John Doe", "Created: 2023-01-01", "Chunk Content"]
            .iter()
            .map(|marker| context.find(marker).expect("marker present"))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

        let stored = writer.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].source_id, "src1");
        assert_eq!(stored[0].author.as_deref(), Some("John Doe"));
        assert_eq!(stored[0].vector, vec![0.1, 0.2]);
        assert_eq!(
            disposition,
            Disposition::Stored {
                object_id: stored[0].object_id()
            }
        );
        assert_eq!(metrics.snapshot().stored, 1);
    }

    #[tokio::test]
    async fn null_fields_do_not_drop_the_task() {
        let embedder = Arc::new(StubEmbedder::ok());
        let writer = Arc::new(StubWriter::default());
        let (consumer, metrics) = consumer(&embedder, &writer);

        let body = br#"{"source_id":"s","content":"real text","title":null,"chunk_index":0}"#;
        let disposition = consumer.handle_message(body).await.expect("handled");

        assert!(matches!(disposition, Disposition::Stored { .. }));
        assert_eq!(embedder.calls(), vec!["real text".to_string()]);
        assert_eq!(writer.stored()[0].title, "");
        assert_eq!(metrics.snapshot().dropped, 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged_without_side_effects() {
        let embedder = Arc::new(StubEmbedder::ok());
        let writer = Arc::new(StubWriter::default());
        let (consumer, metrics) = consumer(&embedder, &writer);

        let bodies: [&[u8]; 4] = [b"invalid json", b"[1,2,3]", b"\"text\"", b""];
        for body in bodies {
            let disposition = consumer.handle_message(body).await.expect("acknowledged");
            assert!(matches!(disposition, Disposition::Dropped { .. }));
        }

        assert!(embedder.calls().is_empty());
        assert!(writer.stored().is_empty());
        assert_eq!(metrics.snapshot().dropped, 4);
    }

    #[tokio::test]
    async fn embed_failure_is_returned_and_store_is_skipped() {
        let embedder = Arc::new(StubEmbedder::failing());
        let writer = Arc::new(StubWriter::default());
        let (consumer, metrics) = consumer(&embedder, &writer);

        let err = consumer.handle_message(TASK.as_bytes()).await.expect_err("embed fails");

        match &err {
            PipelineError::Embedding(ProviderError::UnexpectedStatus { status, body, .. }) => {
                assert_eq!(*status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(writer.stored().is_empty());
        assert_eq!(metrics.snapshot().stored, 0);
    }

    #[tokio::test]
    async fn store_failure_is_returned_after_single_embed() {
        let embedder = Arc::new(StubEmbedder::ok());
        let writer = Arc::new(StubWriter {
            fail: true,
            ..StubWriter::default()
        });
        let (consumer, _) = consumer(&embedder, &writer);

        let err = consumer.handle_message(TASK.as_bytes()).await.expect_err("store fails");

        assert!(matches!(err, PipelineError::Store(WeaviateError::Rejected(_))));
        assert_eq!(embedder.calls().len(), 1);
        assert_eq!(writer.stored().len(), 1);
    }

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let err = PipelineError::Embedding(ProviderError::NotConfigured("gemini api key"));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(
            err.to_string(),
            "embedding failed: gemini api key not configured"
        );
    }
}
