//! Query-time reranking through Jina or Cohere, selected by settings.

use super::{ProviderCache, ProviderError, ProviderKey, status_error};
use crate::config::ProviderEndpoints;
use crate::settings::SettingsStore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Rerank providers this build can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankProvider {
    /// Jina AI `/v1/rerank`.
    Jina,
    /// Cohere `/v2/rerank`.
    Cohere,
}

impl RerankProvider {
    /// Parse the settings value; `""` and `"none"` mean reranking is disabled.
    pub fn parse(value: &str) -> Result<Option<Self>, ProviderError> {
        match value.trim().to_lowercase().as_str() {
            "" | "none" => Ok(None),
            "jina" => Ok(Some(Self::Jina)),
            "cohere" => Ok(Some(Self::Cohere)),
            other => Err(ProviderError::UnsupportedProvider(other.to_string())),
        }
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Jina => "jina",
            Self::Cohere => "cohere",
        }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_documents: Option<bool>,
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: i64,
}

struct RerankTransport {
    provider: &'static str,
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl RerankTransport {
    fn new(
        provider: RerankProvider,
        api_key: &str,
        endpoint: String,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent("chunkflow/0.1")
            .timeout(timeout)
            .build()
            .map_err(|source| ProviderError::ClientBuild {
                provider: provider.name(),
                source,
            })?;
        Ok(Self {
            provider: provider.name(),
            http,
            endpoint,
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn send(&self, request: &RerankRequest<'_>) -> Result<Vec<usize>, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: self.provider,
                source,
            })?;

        if !response.status().is_success() {
            return Err(status_error(self.provider, response).await);
        }

        let payload: RerankResponse =
            response
                .json()
                .await
                .map_err(|err| ProviderError::InvalidResponse {
                    provider: self.provider,
                    message: err.to_string(),
                })?;
        Ok(extract_order(payload.results, request.documents.len()))
    }
}

/// Keep provider order, dropping indices that do not point into the document list.
fn extract_order(results: Vec<RerankResult>, document_count: usize) -> Vec<usize> {
    results
        .into_iter()
        .filter_map(|result| usize::try_from(result.index).ok())
        .filter(|index| *index < document_count)
        .collect()
}

/// Jina AI reranker.
pub struct JinaReranker(RerankTransport);

impl JinaReranker {
    fn new(api_key: &str, endpoints: &ProviderEndpoints) -> Result<Self, ProviderError> {
        let endpoint = format!("{}/v1/rerank", endpoints.jina_base_url.trim_end_matches('/'));
        RerankTransport::new(
            RerankProvider::Jina,
            api_key,
            endpoint,
            &endpoints.jina_rerank_model,
            endpoints.request_timeout(),
        )
        .map(Self)
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<usize>, ProviderError> {
        self.0
            .send(&RerankRequest {
                model: &self.0.model,
                query,
                documents,
                top_n: documents.len(),
                return_documents: Some(false),
            })
            .await
    }
}

/// Cohere reranker.
pub struct CohereReranker(RerankTransport);

impl CohereReranker {
    fn new(api_key: &str, endpoints: &ProviderEndpoints) -> Result<Self, ProviderError> {
        let endpoint = format!("{}/v2/rerank", endpoints.cohere_base_url.trim_end_matches('/'));
        RerankTransport::new(
            RerankProvider::Cohere,
            api_key,
            endpoint,
            &endpoints.cohere_rerank_model,
            endpoints.request_timeout(),
        )
        .map(Self)
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<usize>, ProviderError> {
        self.0
            .send(&RerankRequest {
                model: &self.0.model,
                query,
                documents,
                top_n: documents.len(),
                return_documents: None,
            })
            .await
    }
}

/// Provider-specific reranker selected from settings.
pub enum RerankBackend {
    /// Jina-backed client.
    Jina(JinaReranker),
    /// Cohere-backed client.
    Cohere(CohereReranker),
}

impl RerankBackend {
    /// Build the backend for `provider` bound to `api_key`.
    pub fn build(
        provider: RerankProvider,
        api_key: &str,
        endpoints: &ProviderEndpoints,
    ) -> Result<Self, ProviderError> {
        match provider {
            RerankProvider::Jina => JinaReranker::new(api_key, endpoints).map(Self::Jina),
            RerankProvider::Cohere => CohereReranker::new(api_key, endpoints).map(Self::Cohere),
        }
    }

    /// Provider this backend talks to.
    pub fn provider(&self) -> RerankProvider {
        match self {
            Self::Jina(_) => RerankProvider::Jina,
            Self::Cohere(_) => RerankProvider::Cohere,
        }
    }

    /// Order `documents` by relevance to `query`, returning original positions.
    pub async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<usize>, ProviderError> {
        match self {
            Self::Jina(client) => client.rerank(query, documents).await,
            Self::Cohere(client) => client.rerank(query, documents).await,
        }
    }
}

/// Rerank client that follows the provider and key stored in settings.
pub struct DynamicRerankClient {
    settings: Arc<dyn SettingsStore>,
    endpoints: ProviderEndpoints,
    cache: ProviderCache<RerankBackend>,
}

impl DynamicRerankClient {
    /// Create a client reading provider selection and credentials from `settings`.
    pub fn new(settings: Arc<dyn SettingsStore>, endpoints: ProviderEndpoints) -> Self {
        Self {
            settings,
            endpoints,
            cache: ProviderCache::new(),
        }
    }

    /// Resolve the backend for the current settings, or `None` when reranking is disabled.
    pub async fn client(&self) -> Result<Option<Arc<RerankBackend>>, ProviderError> {
        let settings = self.settings.get().await.map_err(ProviderError::Settings)?;
        let Some(provider) = RerankProvider::parse(&settings.rerank_provider)? else {
            return Ok(None);
        };
        let api_key = settings.rerank_api_key.trim();
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured("rerank api key"));
        }

        let endpoints = &self.endpoints;
        self.cache
            .get_or_build(ProviderKey::new(provider.name(), api_key), |key| {
                RerankBackend::build(provider, &key.credential, endpoints)
            })
            .map(Some)
    }

    /// Order `documents` by relevance to `query`.
    ///
    /// With reranking disabled the identity order is returned without any network call.
    pub async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<usize>, ProviderError> {
        let Some(backend) = self.client().await? else {
            return Ok((0..documents.len()).collect());
        };
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let order = backend.rerank(query, documents).await?;
        tracing::debug!(
            provider = backend.provider().name(),
            documents = documents.len(),
            returned = order.len(),
            "Reranked documents"
        );
        Ok(order)
    }

    /// Key of the backend currently held, if one has been built.
    pub fn current_key(&self) -> Option<ProviderKey> {
        self.cache.current_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{InMemorySettingsStore, Settings, SettingsError};
    use async_trait::async_trait;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    /// Store whose reads always fail at the storage layer.
    struct UnreadableSettings;

    #[async_trait]
    impl SettingsStore for UnreadableSettings {
        async fn get(&self) -> Result<Settings, SettingsError> {
            Err(SettingsError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        }

        async fn update(&self, _settings: Settings) -> Result<(), SettingsError> {
            Err(SettingsError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        }
    }

    fn client_for(base_url: &str, provider: &str, key: &str) -> (Arc<InMemorySettingsStore>, DynamicRerankClient) {
        let store = Arc::new(InMemorySettingsStore::new(Settings {
            rerank_provider: provider.into(),
            rerank_api_key: key.into(),
            ..Settings::default()
        }));
        let client = DynamicRerankClient::new(store.clone(), ProviderEndpoints::with_base_url(base_url));
        (store, client)
    }

    #[test]
    fn parse_accepts_known_providers() {
        assert_eq!(RerankProvider::parse("").expect("empty"), None);
        assert_eq!(RerankProvider::parse("none").expect("none"), None);
        assert_eq!(RerankProvider::parse(" Jina ").expect("jina"), Some(RerankProvider::Jina));
        assert_eq!(RerankProvider::parse("COHERE").expect("cohere"), Some(RerankProvider::Cohere));
        assert!(matches!(
            RerankProvider::parse("voyage"),
            Err(ProviderError::UnsupportedProvider(name)) if name == "voyage"
        ));
    }

    #[test]
    fn extract_order_drops_out_of_range_indices() {
        let results = vec![
            RerankResult { index: 2 },
            RerankResult { index: 7 },
            RerankResult { index: -1 },
            RerankResult { index: 0 },
        ];
        assert_eq!(extract_order(results, 3), vec![2, 0]);
    }

    #[tokio::test]
    async fn unreadable_settings_fail_without_network_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;

        let client = DynamicRerankClient::new(
            Arc::new(UnreadableSettings),
            ProviderEndpoints::with_base_url(&server.base_url()),
        );
        let err = client
            .rerank("query", &docs(&["a", "b"]))
            .await
            .expect_err("settings failure");

        assert!(matches!(err, ProviderError::Settings(_)));
        assert!(err.to_string().starts_with("failed to get settings"));
        assert!(!err.is_configuration());
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn disabled_provider_returns_identity_without_network() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;

        for provider in ["none", ""] {
            let (_, client) = client_for(&server.base_url(), provider, "");
            let order = client
                .rerank("query", &docs(&["a", "b", "c", "d"]))
                .await
                .expect("identity");
            assert_eq!(order, vec![0, 1, 2, 3]);
        }
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn jina_results_are_returned_in_provider_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/rerank")
                    .header("authorization", "Bearer jina-key")
                    .json_body(json!({
                        "model": "jina-reranker-v2-base-multilingual",
                        "query": "rust",
                        "documents": ["python", "rust"],
                        "top_n": 2,
                        "return_documents": false
                    }));
                then.status(200).json_body(json!({
                    "results": [
                        { "index": 1, "relevance_score": 0.9 },
                        { "index": 0, "relevance_score": 0.8 }
                    ]
                }));
            })
            .await;

        let (_, client) = client_for(&server.base_url(), "jina", "jina-key");
        let order = client.rerank("rust", &docs(&["python", "rust"])).await.expect("rerank");

        mock.assert_async().await;
        assert_eq!(order, vec![1, 0]);
    }

    #[tokio::test]
    async fn cohere_uses_v2_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/rerank")
                    .header("authorization", "Bearer co-key");
                then.status(200).json_body(json!({
                    "results": [
                        { "index": 2, "relevance_score": 0.7 },
                        { "index": 5, "relevance_score": 0.6 },
                        { "index": 0, "relevance_score": 0.2 }
                    ]
                }));
            })
            .await;

        let (_, client) = client_for(&server.base_url(), "cohere", "co-key");
        let order = client.rerank("q", &docs(&["a", "b", "c"])).await.expect("rerank");

        mock.assert_async().await;
        assert_eq!(order, vec![2, 0]);
    }

    #[tokio::test]
    async fn error_status_reports_code_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/rerank");
                then.status(401).body("{\"detail\":\"bad key\"}");
            })
            .await;

        let (_, client) = client_for(&server.base_url(), "jina", "wrong");
        let err = client.rerank("q", &docs(&["a"])).await.expect_err("unauthorized");
        let message = err.to_string();
        assert!(message.contains("401"), "{message}");
        assert!(message.contains("bad key"), "{message}");
    }

    #[tokio::test]
    async fn missing_key_for_enabled_provider_is_a_configuration_error() {
        let (_, client) = client_for("http://127.0.0.1:1", "cohere", "");
        let err = client.rerank("q", &docs(&["a"])).await.expect_err("no key");
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "rerank api key not configured");
    }

    #[tokio::test]
    async fn switching_provider_rebuilds_backend() {
        let (store, client) = client_for("http://127.0.0.1:1", "jina", "k");
        let jina = client.client().await.expect("jina").expect("enabled");
        assert_eq!(jina.provider(), RerankProvider::Jina);

        store
            .update(Settings {
                rerank_provider: "cohere".into(),
                rerank_api_key: "k".into(),
                ..Settings::default()
            })
            .await
            .expect("switch");

        let cohere = client.client().await.expect("cohere").expect("enabled");
        assert_eq!(cohere.provider(), RerankProvider::Cohere);
        assert_eq!(client.current_key(), Some(ProviderKey::new("cohere", "k")));
    }
}
