use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the indexing pipeline.
///
/// Provider credentials are not part of it; they live in the settings store and are
/// re-read on every provider call.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Weaviate instance that stores chunk vectors.
    pub weaviate_url: String,
    /// Optional bearer token required to access Weaviate.
    pub weaviate_api_key: Option<String>,
    /// Name of the Weaviate class holding chunk records.
    pub weaviate_class: String,
    /// Per-request timeout for Weaviate calls, in seconds.
    pub weaviate_timeout_secs: u64,
    /// Location of the SQLite file backing the settings row.
    pub settings_db_path: String,
    /// Gemini key used only to seed the settings row on first creation.
    pub gemini_api_key_seed: Option<String>,
    /// Endpoints and models for the embedding and rerank providers.
    pub providers: ProviderEndpoints,
    /// Name of the embedding-task topic.
    pub embed_task_topic: String,
    /// Number of concurrent queue workers.
    pub worker_count: usize,
    /// Delivery attempts before a task lands in the failed-jobs list.
    pub queue_max_attempts: u32,
    /// Base redelivery backoff in milliseconds.
    pub queue_retry_backoff_ms: u64,
    /// HTTP server port.
    pub server_port: u16,
}

/// Network coordinates of the third-party providers.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpoints {
    /// Base URL of the Gemini API.
    pub gemini_base_url: String,
    /// Gemini embedding model identifier.
    pub gemini_embedding_model: String,
    /// Base URL of the Jina API.
    pub jina_base_url: String,
    /// Jina rerank model identifier.
    pub jina_rerank_model: String,
    /// Base URL of the Cohere API.
    pub cohere_base_url: String,
    /// Cohere rerank model identifier.
    pub cohere_rerank_model: String,
    /// Per-request timeout applied to provider calls.
    pub request_timeout_secs: u64,
}

impl ProviderEndpoints {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Point every provider at the same base URL; handy for mock servers.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            gemini_base_url: base_url.to_string(),
            jina_base_url: base_url.to_string(),
            cohere_base_url: base_url.to_string(),
            ..Self::default()
        }
    }
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
            gemini_embedding_model: "text-embedding-004".into(),
            jina_base_url: "https://api.jina.ai".into(),
            jina_rerank_model: "jina-reranker-v2-base-multilingual".into(),
            cohere_base_url: "https://api.cohere.com".into(),
            cohere_rerank_model: "rerank-v3.5".into(),
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ProviderEndpoints::default();
        Ok(Self {
            weaviate_url: load_env("WEAVIATE_URL")?,
            weaviate_api_key: load_env_optional("WEAVIATE_API_KEY"),
            weaviate_class: load_env_optional("WEAVIATE_CLASS").unwrap_or_else(|| "Chunk".into()),
            weaviate_timeout_secs: parse_optional("WEAVIATE_TIMEOUT_SECS")?.unwrap_or(30),
            settings_db_path: load_env_optional("SETTINGS_DB_PATH")
                .unwrap_or_else(|| "data/settings.db".into()),
            gemini_api_key_seed: load_env_optional("GEMINI_API_KEY"),
            providers: ProviderEndpoints {
                gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                    .unwrap_or(defaults.gemini_base_url),
                gemini_embedding_model: load_env_optional("GEMINI_EMBEDDING_MODEL")
                    .unwrap_or(defaults.gemini_embedding_model),
                jina_base_url: load_env_optional("JINA_BASE_URL").unwrap_or(defaults.jina_base_url),
                jina_rerank_model: load_env_optional("JINA_RERANK_MODEL")
                    .unwrap_or(defaults.jina_rerank_model),
                cohere_base_url: load_env_optional("COHERE_BASE_URL")
                    .unwrap_or(defaults.cohere_base_url),
                cohere_rerank_model: load_env_optional("COHERE_RERANK_MODEL")
                    .unwrap_or(defaults.cohere_rerank_model),
                request_timeout_secs: parse_optional("PROVIDER_TIMEOUT_SECS")?
                    .unwrap_or(defaults.request_timeout_secs),
            },
            embed_task_topic: load_env_optional("EMBED_TASK_TOPIC")
                .unwrap_or_else(|| "embed_tasks".into()),
            worker_count: parse_optional("WORKER_COUNT")?.unwrap_or(4),
            queue_max_attempts: parse_optional("QUEUE_MAX_ATTEMPTS")?.unwrap_or(5),
            queue_retry_backoff_ms: parse_optional("QUEUE_RETRY_BACKOFF_MS")?.unwrap_or(1000),
            server_port: parse_optional("SERVER_PORT")?.unwrap_or(8080),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        weaviate_url = %config.weaviate_url,
        class = %config.weaviate_class,
        topic = %config.embed_task_topic,
        workers = config.worker_count,
        server_port = config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
