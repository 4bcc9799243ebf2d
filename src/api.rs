//! HTTP surface for Chunkflow.
//!
//! - `POST /tasks` – Enqueue one raw embed-task body on the embedding topic.
//! - `GET /settings` / `PUT /settings` – Read or replace the settings row.
//! - `POST /rerank` – Order documents by relevance using the configured rerank provider.
//! - `DELETE /sources?source_url=...` – Remove every stored chunk of one document.
//! - `GET /failed-jobs` – Tasks that exhausted their delivery attempts.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /commands` – Machine-readable route catalog.

use crate::metrics::PipelineMetrics;
use crate::providers::{DynamicRerankClient, ProviderError};
use crate::queue::TaskQueue;
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::weaviate::{ChunkWriter, WeaviateError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handles used by the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Settings row storage.
    pub settings: Arc<dyn SettingsStore>,
    /// Embedding-task topic.
    pub queue: Arc<TaskQueue>,
    /// Query-time rerank client.
    pub reranker: Arc<DynamicRerankClient>,
    /// Chunk store used for deletions.
    pub writer: Arc<dyn ChunkWriter>,
    /// Pipeline counters.
    pub metrics: Arc<PipelineMetrics>,
}

/// Build the HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(enqueue_task))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/rerank", post(rerank))
        .route("/sources", axum::routing::delete(delete_source))
        .route("/failed-jobs", get(failed_jobs))
        .route("/metrics", get(get_metrics))
        .route("/commands", get(get_commands))
        .with_state(state)
}

#[derive(Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Serialize)]
struct EnqueueResponse {
    id: Uuid,
}

/// Accept a raw embed-task body; validation happens in the consumer.
async fn enqueue_task(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let id = state.queue.enqueue(body.to_vec());
    (StatusCode::ACCEPTED, Json(EnqueueResponse { id }))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<DataResponse<Settings>>, AppError> {
    let settings = state.settings.get().await?;
    Ok(Json(DataResponse { data: settings }))
}

/// Replace the settings row. The body must carry every field.
async fn update_settings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DataResponse<Settings>>, AppError> {
    let settings: Settings = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("invalid settings body: {err}")))?;
    state.settings.update(settings.clone()).await?;
    Ok(Json(DataResponse { data: settings }))
}

#[derive(Deserialize)]
struct RerankRequest {
    query: String,
    documents: Vec<String>,
}

async fn rerank(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DataResponse<Vec<usize>>>, AppError> {
    let request: RerankRequest = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("invalid rerank body: {err}")))?;
    let order = state
        .reranker
        .rerank(&request.query, &request.documents)
        .await?;
    Ok(Json(DataResponse { data: order }))
}

#[derive(Deserialize)]
struct DeleteSourceQuery {
    source_url: String,
}

#[derive(Serialize)]
struct DeleteSourceResponse {
    deleted: u64,
}

async fn delete_source(
    State(state): State<AppState>,
    Query(query): Query<DeleteSourceQuery>,
) -> Result<Json<DeleteSourceResponse>, AppError> {
    if query.source_url.trim().is_empty() {
        return Err(AppError::BadRequest("source_url must not be empty".into()));
    }
    let deleted = state.writer.delete_by_source_url(&query.source_url).await?;
    Ok(Json(DeleteSourceResponse { deleted }))
}

async fn failed_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataResponse {
        data: state.queue.failed_jobs(),
    })
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "topic": state.queue.topic(),
        "outstanding": state.queue.outstanding(),
        "counters": state.metrics.snapshot(),
    }))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

async fn get_commands() -> Json<DataResponse<Vec<CommandDescriptor>>> {
    Json(DataResponse {
        data: vec![
            CommandDescriptor {
                name: "enqueue_task",
                method: "POST",
                path: "/tasks",
                description: "Queue one chunk for embedding and storage.",
            },
            CommandDescriptor {
                name: "get_settings",
                method: "GET",
                path: "/settings",
                description: "Return the provider and search settings row.",
            },
            CommandDescriptor {
                name: "update_settings",
                method: "PUT",
                path: "/settings",
                description: "Replace the settings row; takes effect on the next task.",
            },
            CommandDescriptor {
                name: "rerank",
                method: "POST",
                path: "/rerank",
                description: "Return document indices ordered by relevance to the query.",
            },
            CommandDescriptor {
                name: "delete_source",
                method: "DELETE",
                path: "/sources?source_url=",
                description: "Delete every chunk stored for a document URL.",
            },
            CommandDescriptor {
                name: "failed_jobs",
                method: "GET",
                path: "/failed-jobs",
                description: "List tasks that exhausted their delivery attempts.",
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters.",
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Settings(SettingsError),
    Provider(ProviderError),
    Store(WeaviateError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Settings(err @ SettingsError::Invalid(_)) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Settings(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::Provider(err) if err.is_configuration() => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Provider(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            Self::Store(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "Request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<SettingsError> for AppError {
    fn from(inner: SettingsError) -> Self {
        Self::Settings(inner)
    }
}

impl From<ProviderError> for AppError {
    fn from(inner: ProviderError) -> Self {
        Self::Provider(inner)
    }
}

impl From<WeaviateError> for AppError {
    fn from(inner: WeaviateError) -> Self {
        Self::Store(inner)
    }
}
