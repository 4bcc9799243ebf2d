//! Helpers for turning chunks into Weaviate object properties.

use crate::pipeline::Chunk;
use serde_json::{Map, Value};

/// Build the property object stored alongside each chunk vector.
///
/// Optional metadata is omitted rather than written as `null`.
pub(crate) fn build_properties(chunk: &Chunk) -> Value {
    let mut properties = Map::new();
    properties.insert("content".into(), Value::String(chunk.content.clone()));
    properties.insert("source_id".into(), Value::String(chunk.source_id.clone()));
    properties.insert("source_url".into(), Value::String(chunk.source_url.clone()));
    properties.insert("source_name".into(), Value::String(chunk.source_name.clone()));
    properties.insert("path".into(), Value::String(chunk.path.clone()));
    properties.insert("title".into(), Value::String(chunk.title.clone()));
    properties.insert("chunk_index".into(), Value::from(chunk.chunk_index));
    properties.insert("type".into(), Value::String(chunk.chunk_type.clone()));
    properties.insert("language".into(), Value::String(chunk.language.clone()));

    if let Some(author) = chunk.author.as_ref().filter(|value| !value.is_empty()) {
        properties.insert("author".into(), Value::String(author.clone()));
    }
    if let Some(created_at) = chunk.created_at.as_ref().filter(|value| !value.is_empty()) {
        properties.insert("created_at".into(), Value::String(created_at.clone()));
    }
    if let Some(page_count) = chunk.page_count {
        properties.insert("page_count".into(), Value::from(page_count));
    }

    Value::Object(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EmbedTask;
    use crate::weaviate::schema::REQUIRED_PROPERTIES;

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let chunk = EmbedTask {
            source_id: "s".into(),
            content: "body".into(),
            ..EmbedTask::default()
        }
        .into_chunk(vec![0.1]);

        let properties = build_properties(&chunk);
        assert_eq!(properties["content"], "body");
        assert_eq!(properties["chunk_index"], 0);
        assert!(properties.get("author").is_none());
        assert!(properties.get("created_at").is_none());
        assert!(properties.get("page_count").is_none());
    }

    #[test]
    fn every_written_property_is_in_the_schema() {
        let chunk = EmbedTask {
            author: Some("a".into()),
            created_at: Some("2024-05-01".into()),
            page_count: Some(4),
            ..EmbedTask::default()
        }
        .into_chunk(vec![]);

        let properties = build_properties(&chunk);
        let object = properties.as_object().expect("object");
        assert_eq!(object.len(), REQUIRED_PROPERTIES.len());
        for key in object.keys() {
            assert!(
                REQUIRED_PROPERTIES.iter().any(|property| property.name == key),
                "{key} missing from schema"
            );
        }
    }
}
