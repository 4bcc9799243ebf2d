#![deny(missing_docs)]

//! Core library for the Chunkflow embedding and indexing worker.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Embed-task parsing and the task consumer.
pub mod pipeline;
/// Embedding and rerank provider clients.
pub mod providers;
/// In-process task topic and worker pool.
pub mod queue;
/// Settings row storage.
pub mod settings;
/// Weaviate vector store integration.
pub mod weaviate;
