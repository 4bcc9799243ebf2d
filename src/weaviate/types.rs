//! Shared types used by the Weaviate client, writer, and schema reconciler.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned while interacting with Weaviate.
#[derive(Debug, Error)]
pub enum WeaviateError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Weaviate URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Weaviate responded with an unexpected status code.
    #[error("Unexpected Weaviate response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Weaviate.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Batch request succeeded at the HTTP level but an object was refused.
    #[error("Weaviate rejected object: {0}")]
    Rejected(String),
}

/// Primitive property types used by the chunk class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Tokenized string.
    Text,
    /// 64-bit integer.
    Int,
}

impl DataType {
    /// Name understood by the Weaviate schema API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
        }
    }
}

/// One entry of the required property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    /// Property name.
    pub name: &'static str,
    /// Property data type.
    pub data_type: DataType,
}

impl PropertySpec {
    /// Schema API representation of this property.
    pub fn to_json(self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "dataType": [self.data_type.as_str()],
        })
    }
}

#[derive(Deserialize)]
pub(crate) struct ClassDefinition {
    #[serde(default)]
    pub(crate) properties: Option<Vec<PropertyDefinition>>,
}

#[derive(Deserialize)]
pub(crate) struct PropertyDefinition {
    pub(crate) name: String,
}

#[derive(Deserialize)]
pub(crate) struct BatchObjectResponse {
    #[serde(default)]
    pub(crate) result: Option<BatchObjectResult>,
}

#[derive(Deserialize)]
pub(crate) struct BatchObjectResult {
    #[serde(default)]
    pub(crate) errors: Option<BatchErrors>,
}

#[derive(Deserialize)]
pub(crate) struct BatchErrors {
    #[serde(default)]
    pub(crate) error: Vec<BatchErrorMessage>,
}

#[derive(Deserialize)]
pub(crate) struct BatchErrorMessage {
    pub(crate) message: String,
}

#[derive(Deserialize)]
pub(crate) struct BatchDeleteResponse {
    pub(crate) results: BatchDeleteResults,
}

#[derive(Deserialize)]
pub(crate) struct BatchDeleteResults {
    #[serde(default)]
    pub(crate) successful: u64,
    #[serde(default)]
    pub(crate) failed: u64,
}
