//! Weaviate vector store integration.

pub mod client;
mod payload;
/// Startup schema reconciliation.
pub mod schema;
pub mod types;
mod writer;

pub use client::WeaviateService;
pub use schema::{REQUIRED_PROPERTIES, SchemaBackend, SchemaReport, ensure_schema};
pub use types::{DataType, PropertySpec, WeaviateError};
pub use writer::{ChunkWriter, WeaviateChunkWriter};
