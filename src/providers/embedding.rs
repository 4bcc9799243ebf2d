//! Text embedding through the Gemini API.

use super::{ProviderCache, ProviderError, ProviderKey, status_error};
use crate::config::ProviderEndpoints;
use crate::settings::SettingsStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "gemini";

/// Anything that turns one text into one dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Gemini `embedContent` client bound to one API key.
pub struct GeminiEmbedder {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiEmbedder {
    /// Build a client for `api_key` against the given base URL and model.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent("chunkflow/0.1")
            .timeout(timeout)
            .build()
            .map_err(|source| ProviderError::ClientBuild {
                provider: PROVIDER,
                source,
            })?;
        let endpoint = format!(
            "{}/v1beta/models/{}:embedContent",
            base_url.trim_end_matches('/'),
            model
        );
        Ok(Self {
            http,
            endpoint,
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [ { "text": text } ] },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }

        let payload: EmbedContentResponse =
            response
                .json()
                .await
                .map_err(|err| ProviderError::InvalidResponse {
                    provider: PROVIDER,
                    message: err.to_string(),
                })?;

        let values = payload.embedding.values;
        if values.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER,
                message: "embedding contained no values".into(),
            });
        }

        tracing::debug!(model = %self.model, dimension = values.len(), "Generated embedding");
        Ok(values)
    }
}

/// Embedding client that follows the Gemini key stored in settings.
///
/// Settings are read on every call; the underlying [`GeminiEmbedder`] is rebuilt only when the
/// key changes.
pub struct DynamicEmbeddingClient {
    settings: Arc<dyn SettingsStore>,
    endpoints: ProviderEndpoints,
    cache: ProviderCache<GeminiEmbedder>,
}

impl DynamicEmbeddingClient {
    /// Create a client reading credentials from `settings`.
    pub fn new(settings: Arc<dyn SettingsStore>, endpoints: ProviderEndpoints) -> Self {
        Self {
            settings,
            endpoints,
            cache: ProviderCache::new(),
        }
    }

    /// Resolve the client for the currently configured key.
    pub async fn client(&self) -> Result<Arc<GeminiEmbedder>, ProviderError> {
        let settings = self.settings.get().await.map_err(ProviderError::Settings)?;
        let api_key = settings.gemini_api_key.trim();
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured("gemini api key"));
        }

        let endpoints = &self.endpoints;
        self.cache
            .get_or_build(ProviderKey::new(PROVIDER, api_key), |key| {
                GeminiEmbedder::new(
                    &key.credential,
                    &endpoints.gemini_base_url,
                    &endpoints.gemini_embedding_model,
                    endpoints.request_timeout(),
                )
            })
    }

    /// Key of the client currently held, if one has been built.
    pub fn current_key(&self) -> Option<ProviderKey> {
        self.cache.current_key()
    }
}

#[async_trait]
impl Embedder for DynamicEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.client().await?.embed(text).await
    }
}
