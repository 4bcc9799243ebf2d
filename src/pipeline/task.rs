//! Embed-task payloads and the chunk records derived from them.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Namespace for deterministic chunk object ids.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6c0e_51f4_2a8b_4f0e_9d1c_7b3a_e5f2_0c41);

/// One chunk waiting to be embedded, as published by the ingestion flow.
///
/// Missing or `null` fields fall back to their empty values; only bytes that are not a JSON
/// object at all are treated as malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedTask {
    /// Identifier of the source the document came from.
    #[serde(deserialize_with = "null_as_default")]
    pub source_id: String,
    /// Canonical URL of the document.
    #[serde(deserialize_with = "null_as_default")]
    pub source_url: String,
    /// Human-readable source name.
    #[serde(deserialize_with = "null_as_default")]
    pub source_name: String,
    /// Document title.
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    /// Path of the document inside its source.
    #[serde(deserialize_with = "null_as_default")]
    pub path: String,
    /// Raw chunk text.
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    /// Position of the chunk within its document.
    #[serde(deserialize_with = "null_as_default")]
    pub chunk_index: i64,
    /// Kind of chunk (`text`, `table`, `code`, ...).
    #[serde(deserialize_with = "null_as_default")]
    pub chunk_type: String,
    /// Detected content language.
    #[serde(deserialize_with = "null_as_default")]
    pub language: String,
    /// Document author, when known.
    pub author: Option<String>,
    /// Document creation date as provided upstream.
    pub created_at: Option<String>,
    /// Page count of the original document, when known.
    pub page_count: Option<i64>,
    /// Identifier tying the task to the ingestion run that produced it.
    #[serde(deserialize_with = "null_as_default")]
    pub correlation_id: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl EmbedTask {
    /// Text sent to the embedding provider.
    ///
    /// Non-empty `Title`, `Author`, and `Created` lines come first, in that order, followed by the
    /// content.
    pub fn embedding_context(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(4);
        if !self.title.is_empty() {
            lines.push(format!("Title: {}", self.title));
        }
        if let Some(author) = non_empty(&self.author) {
            lines.push(format!("Author: {author}"));
        }
        if let Some(created_at) = non_empty(&self.created_at) {
            lines.push(format!("Created: {created_at}"));
        }
        lines.push(self.content.clone());
        lines.join("\n")
    }

    /// Combine the task with its vector into the record that gets stored.
    pub fn into_chunk(self, vector: Vec<f32>) -> Chunk {
        Chunk {
            content: self.content,
            vector,
            source_id: self.source_id,
            source_url: self.source_url,
            source_name: self.source_name,
            path: self.path,
            chunk_index: self.chunk_index,
            chunk_type: self.chunk_type,
            language: self.language,
            title: self.title,
            author: self.author.filter(|value| !value.is_empty()),
            created_at: self.created_at.filter(|value| !value.is_empty()),
            page_count: self.page_count,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Stored record: chunk text, its vector, and the metadata used for filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Raw chunk text.
    pub content: String,
    /// Embedding produced by the provider.
    pub vector: Vec<f32>,
    /// Identifier of the originating source.
    pub source_id: String,
    /// Canonical URL of the document.
    pub source_url: String,
    /// Human-readable source name.
    pub source_name: String,
    /// Path of the document inside its source.
    pub path: String,
    /// Position of the chunk within its document.
    pub chunk_index: i64,
    /// Kind of chunk.
    #[serde(rename = "type")]
    pub chunk_type: String,
    /// Content language.
    pub language: String,
    /// Document title.
    pub title: String,
    /// Document author.
    pub author: Option<String>,
    /// Document creation date.
    pub created_at: Option<String>,
    /// Page count of the original document.
    pub page_count: Option<i64>,
}

impl Chunk {
    /// Deterministic object id over `(source_id, source_url or path, chunk_index)`.
    ///
    /// Redelivered tasks map to the same id, so a repeated write overwrites instead of
    /// duplicating.
    pub fn object_id(&self) -> Uuid {
        let locator = if self.source_url.is_empty() {
            &self.path
        } else {
            &self.source_url
        };
        let key = format!("{}\u{1f}{}\u{1f}{}", self.source_id, locator, self.chunk_index);
        Uuid::new_v5(&CHUNK_NAMESPACE, key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> EmbedTask {
        EmbedTask {
            source_id: "src1".into(),
            content: "Chunk Content".into(),
            title: "Title".into(),
            author: Some("John Doe".into()),
            created_at: Some("2023-01-01".into()),
            chunk_index: 0,
            ..EmbedTask::default()
        }
    }

    #[test]
    fn context_lists_metadata_before_content() {
        assert_eq!(
            task().embedding_context(),
            "Title: Title\nAuthor: John Doe\nCreated: 2023-01-01\nChunk Content"
        );
    }

    #[test]
    fn context_skips_each_empty_field_independently() {
        let only_author = EmbedTask {
            title: String::new(),
            created_at: Some(String::new()),
            ..task()
        };
        assert_eq!(only_author.embedding_context(), "Author: John Doe\nChunk Content");

        let only_created = EmbedTask {
            title: String::new(),
            author: None,
            ..task()
        };
        assert_eq!(only_created.embedding_context(), "Created: 2023-01-01\nChunk Content");

        let bare = EmbedTask {
            content: "just text".into(),
            ..EmbedTask::default()
        };
        assert_eq!(bare.embedding_context(), "just text");
    }

    #[test]
    fn parses_task_with_missing_optional_fields() {
        let parsed: EmbedTask = serde_json::from_str(
            r#"{"source_id":"s","content":"c","chunk_index":3,"author":null,"page_count":12}"#,
        )
        .expect("parse");
        assert_eq!(parsed.chunk_index, 3);
        assert_eq!(parsed.author, None);
        assert_eq!(parsed.page_count, Some(12));
        assert!(parsed.created_at.is_none());
    }

    #[test]
    fn null_fields_read_as_empty() {
        let parsed: EmbedTask = serde_json::from_str(
            r#"{"source_id":"s","content":"x","title":null,"path":null,"language":null,"chunk_index":null}"#,
        )
        .expect("parse");
        assert_eq!(parsed.title, "");
        assert_eq!(parsed.path, "");
        assert_eq!(parsed.chunk_index, 0);
        assert_eq!(parsed.embedding_context(), "x");
    }

    #[test]
    fn chunk_serializes_type_field() {
        let chunk = EmbedTask {
            chunk_type: "table".into(),
            ..task()
        }
        .into_chunk(vec![0.5]);
        let value = serde_json::to_value(&chunk).expect("serialize");
        assert_eq!(value["type"], "table");
        assert_eq!(value["author"], "John Doe");
    }

    #[test]
    fn object_id_is_stable_per_chunk_identity() {
        let a = task().into_chunk(vec![0.1]);
        let b = EmbedTask {
            content: "edited".into(),
            ..task()
        }
        .into_chunk(vec![0.9]);
        let next = EmbedTask {
            chunk_index: 1,
            ..task()
        }
        .into_chunk(vec![0.1]);

        assert_eq!(a.object_id(), b.object_id());
        assert_ne!(a.object_id(), next.object_id());
    }

    #[test]
    fn object_id_falls_back_to_path_without_url() {
        let by_path = EmbedTask {
            path: "docs/a.md".into(),
            ..task()
        }
        .into_chunk(vec![]);
        let other_path = EmbedTask {
            path: "docs/b.md".into(),
            ..task()
        }
        .into_chunk(vec![]);
        let with_url = EmbedTask {
            path: "docs/a.md".into(),
            source_url: "https://example.org/a".into(),
            ..task()
        }
        .into_chunk(vec![]);

        assert_ne!(by_path.object_id(), other_path.object_id());
        assert_ne!(by_path.object_id(), with_url.object_id());
    }
}
