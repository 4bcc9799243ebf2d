//! HTTP client wrapper for interacting with Weaviate.

use crate::config::get_config;
use crate::weaviate::types::{
    BatchDeleteResponse, BatchObjectResponse, ClassDefinition, PropertySpec, WeaviateError,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lightweight HTTP client for Weaviate operations.
pub struct WeaviateService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl WeaviateService {
    /// Construct a client from the process configuration.
    pub fn from_config() -> Result<Self, WeaviateError> {
        let config = get_config();
        Self::with_timeout(
            &config.weaviate_url,
            config.weaviate_api_key.clone(),
            Duration::from_secs(config.weaviate_timeout_secs),
        )
    }

    /// Construct a client for an explicit base URL with the default request timeout.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, WeaviateError> {
        Self::with_timeout(url, api_key, DEFAULT_TIMEOUT)
    }

    /// Construct a client whose requests give up after `timeout`.
    pub fn with_timeout(
        url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WeaviateError> {
        let client = Client::builder()
            .user_agent("chunkflow/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(url).map_err(WeaviateError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Weaviate HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Whether a class with the given name exists.
    pub async fn class_exists(&self, class: &str) -> Result<bool, WeaviateError> {
        let response = self
            .request(Method::GET, &format!("v1/schema/{class}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = WeaviateError::UnexpectedStatus { status, body };
                tracing::error!(class, error = %error, "Class existence check failed");
                Err(error)
            }
        }
    }

    /// Names of the properties currently defined on `class`.
    pub async fn class_properties(&self, class: &str) -> Result<Vec<String>, WeaviateError> {
        let response = self
            .request(Method::GET, &format!("v1/schema/{class}"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(response, "Failed to fetch class schema").await);
        }

        let definition: ClassDefinition = response.json().await?;
        Ok(definition
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|property| property.name)
            .collect())
    }

    /// Create `class` with the given properties and external vectors.
    pub async fn create_class(
        &self,
        class: &str,
        properties: &[PropertySpec],
    ) -> Result<(), WeaviateError> {
        let body = json!({
            "class": class,
            "vectorizer": "none",
            "properties": properties.iter().map(|property| property.to_json()).collect::<Vec<_>>(),
        });

        let response = self
            .request(Method::POST, "v1/schema")
            .json(&body)
            .send()
            .await?;

        ensure_success(response, || {
            tracing::info!(class, properties = properties.len(), "Class created");
        })
        .await
    }

    /// Add a single property to an existing class.
    pub async fn add_property(
        &self,
        class: &str,
        property: &PropertySpec,
    ) -> Result<(), WeaviateError> {
        let response = self
            .request(Method::POST, &format!("v1/schema/{class}/properties"))
            .json(&property.to_json())
            .send()
            .await?;

        ensure_success(response, || {
            tracing::info!(class, property = property.name, "Property added");
        })
        .await
    }

    /// Insert or overwrite one object with a caller-chosen id.
    pub async fn upsert_object(
        &self,
        class: &str,
        id: Uuid,
        properties: Value,
        vector: &[f32],
    ) -> Result<(), WeaviateError> {
        let body = json!({
            "objects": [{
                "class": class,
                "id": id,
                "properties": properties,
                "vector": vector,
            }]
        });

        let response = self
            .request(Method::POST, "v1/batch/objects")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(response, "Failed to write object").await);
        }

        let results: Vec<BatchObjectResponse> = response.json().await?;
        let messages: Vec<String> = results
            .into_iter()
            .filter_map(|object| object.result)
            .filter_map(|result| result.errors)
            .flat_map(|errors| errors.error)
            .map(|error| error.message)
            .collect();
        if !messages.is_empty() {
            let error = WeaviateError::Rejected(messages.join("; "));
            tracing::error!(class, %id, error = %error, "Weaviate rejected object");
            return Err(error);
        }

        tracing::debug!(class, %id, dimension = vector.len(), "Object upserted");
        Ok(())
    }

    /// Delete every object in `class` whose text `property` equals `value`.
    pub async fn delete_where_equal(
        &self,
        class: &str,
        property: &str,
        value: &str,
    ) -> Result<u64, WeaviateError> {
        let body = json!({
            "match": {
                "class": class,
                "where": {
                    "path": [property],
                    "operator": "Equal",
                    "valueText": value,
                }
            },
            "output": "minimal",
        });

        let response = self
            .request(Method::DELETE, "v1/batch/objects")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(response, "Batch delete failed").await);
        }

        let payload: BatchDeleteResponse = response.json().await?;
        if payload.results.failed > 0 {
            tracing::warn!(
                class,
                property,
                failed = payload.results.failed,
                "Some objects could not be deleted"
            );
        }
        Ok(payload.results.successful)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.bearer_auth(api_key);
        }
        req
    }
}

async fn ensure_success<F>(response: reqwest::Response, on_success: F) -> Result<(), WeaviateError>
where
    F: FnOnce(),
{
    if response.status().is_success() {
        on_success();
        Ok(())
    } else {
        Err(failure(response, "Weaviate request failed").await)
    }
}

async fn failure(response: reqwest::Response, context: &'static str) -> WeaviateError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = WeaviateError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "{context}");
    error
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
