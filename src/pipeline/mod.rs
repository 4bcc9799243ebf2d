//! Embedding-and-indexing pipeline: embed-task parsing, context shaping, and the consumer.

mod consumer;
mod task;

pub use consumer::{Disposition, EmbedTaskConsumer, ErrorCategory, PipelineError};
pub use task::{Chunk, EmbedTask};
