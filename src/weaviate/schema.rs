//! Additive-only reconciliation of the chunk class schema.
//!
//! Run once at startup before any writes. Missing classes are created with every required
//! property; existing classes only gain the properties they lack. Properties are compared by
//! name; types are never diffed and nothing is removed.

use crate::weaviate::client::WeaviateService;
use crate::weaviate::types::{DataType, PropertySpec, WeaviateError};
use async_trait::async_trait;
use std::collections::HashSet;

const fn text(name: &'static str) -> PropertySpec {
    PropertySpec {
        name,
        data_type: DataType::Text,
    }
}

const fn int(name: &'static str) -> PropertySpec {
    PropertySpec {
        name,
        data_type: DataType::Int,
    }
}

/// Properties every chunk class must carry.
pub const REQUIRED_PROPERTIES: [PropertySpec; 12] = [
    text("content"),
    text("source_id"),
    text("source_url"),
    text("source_name"),
    text("path"),
    text("title"),
    int("chunk_index"),
    text("type"),
    text("language"),
    text("author"),
    text("created_at"),
    int("page_count"),
];

/// Schema operations the reconciler needs from the store.
#[async_trait]
pub trait SchemaBackend: Send + Sync {
    /// Whether `class` exists.
    async fn class_exists(&self, class: &str) -> Result<bool, WeaviateError>;
    /// Property names currently defined on `class`.
    async fn class_properties(&self, class: &str) -> Result<Vec<String>, WeaviateError>;
    /// Create `class` with `properties` in one call.
    async fn create_class(&self, class: &str, properties: &[PropertySpec]) -> Result<(), WeaviateError>;
    /// Add one property to `class`.
    async fn add_property(&self, class: &str, property: &PropertySpec) -> Result<(), WeaviateError>;
}

#[async_trait]
impl SchemaBackend for WeaviateService {
    async fn class_exists(&self, class: &str) -> Result<bool, WeaviateError> {
        WeaviateService::class_exists(self, class).await
    }

    async fn class_properties(&self, class: &str) -> Result<Vec<String>, WeaviateError> {
        WeaviateService::class_properties(self, class).await
    }

    async fn create_class(&self, class: &str, properties: &[PropertySpec]) -> Result<(), WeaviateError> {
        WeaviateService::create_class(self, class, properties).await
    }

    async fn add_property(&self, class: &str, property: &PropertySpec) -> Result<(), WeaviateError> {
        WeaviateService::add_property(self, class, property).await
    }
}

/// What a reconciliation run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// The class did not exist and was created.
    pub created: bool,
    /// Properties added to an existing class.
    pub added: Vec<&'static str>,
}

impl SchemaReport {
    /// True when the run performed no writes.
    pub fn is_noop(&self) -> bool {
        !self.created && self.added.is_empty()
    }
}

/// Bring `class` up to the required property table.
pub async fn ensure_schema<B>(backend: &B, class: &str) -> Result<SchemaReport, WeaviateError>
where
    B: SchemaBackend + ?Sized,
{
    if !backend.class_exists(class).await? {
        tracing::info!(class, "Class missing; creating with full property table");
        backend.create_class(class, &REQUIRED_PROPERTIES).await?;
        return Ok(SchemaReport {
            created: true,
            added: Vec::new(),
        });
    }

    let existing: HashSet<String> = backend.class_properties(class).await?.into_iter().collect();
    let mut report = SchemaReport::default();
    for property in REQUIRED_PROPERTIES
        .iter()
        .filter(|property| !existing.contains(property.name))
    {
        backend.add_property(class, property).await?;
        report.added.push(property.name);
    }

    if report.is_noop() {
        tracing::debug!(class, "Schema already up to date");
    } else {
        tracing::info!(class, added = ?report.added, "Schema migrated");
    }
    Ok(report)
}
