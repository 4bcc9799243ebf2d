//! Embedding and rerank providers whose credentials are resolved from settings on every call.

mod cache;
pub mod embedding;
pub mod rerank;

pub use cache::{ProviderCache, ProviderKey};
pub use embedding::{DynamicEmbeddingClient, Embedder, GeminiEmbedder};
pub use rerank::{DynamicRerankClient, RerankBackend, RerankProvider};

use crate::settings::SettingsError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while resolving or calling a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Settings could not be read, so no credential is known.
    #[error("failed to get settings: {0}")]
    Settings(#[source] SettingsError),
    /// Credential or provider selection is missing.
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    /// Settings name a provider this build does not know.
    #[error("unsupported provider '{0}'")]
    UnsupportedProvider(String),
    /// HTTP client could not be constructed for the credential.
    #[error("failed to build {provider} client: {source}")]
    ClientBuild {
        /// Provider the client was meant for.
        provider: &'static str,
        /// Underlying builder failure.
        #[source]
        source: reqwest::Error,
    },
    /// Request never produced a response.
    #[error("{provider} request failed: {source}")]
    Http {
        /// Provider that was called.
        provider: &'static str,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// Provider answered with a non-success status.
    #[error("{provider} returned {status}: {body}")]
    UnexpectedStatus {
        /// Provider that was called.
        provider: &'static str,
        /// HTTP status code.
        status: StatusCode,
        /// Raw response body kept for diagnosis.
        body: String,
    },
    /// Response body did not have the expected shape.
    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse {
        /// Provider that was called.
        provider: &'static str,
        /// What was wrong with the payload.
        message: String,
    },
}

impl ProviderError {
    /// Whether the failure stems from missing or unusable configuration rather than the network.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured(_) | Self::UnsupportedProvider(_) | Self::ClientBuild { .. }
        )
    }
}

/// Read the body of a failed response into an [`ProviderError::UnexpectedStatus`].
pub(crate) async fn status_error(provider: &'static str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = ProviderError::UnexpectedStatus {
        provider,
        status,
        body,
    };
    tracing::error!(provider, error = %error, "Provider request failed");
    error
}
