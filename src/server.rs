//! HTTP surface: the axum router and its handlers.
//!
//! Process-wide state (settings, store, provider clients) is built once
//! at startup and passed to every handler through an `Arc`, never read
//! from ambient globals. The providers stay generic so the integration
//! tests drive the same router with deterministic fakes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    chunking::ChunkingConfig,
    embedding::EmbeddingProvider,
    error::{Error, Result},
    generate::AnswerGenerator,
    ingestion::ingest_batch,
    pipeline::Pipeline,
    schemas::{AskRequest, AskResponse, Feedback, IngestResponse},
    store::ChunkStore,
    webhook::{self, WebhookState},
};

pub struct AppState<E, G> {
    pub pipeline: Pipeline<E, G>,
    pub store: Arc<ChunkStore>,
    pub chunking: ChunkingConfig,
    /// When set, /ask and /ingest require a matching x-api-key header.
    pub api_key: Option<String>,
    pub webhook: Option<WebhookState>,
}

/// Crate error adapted to an HTTP response, FastAPI-style
/// (`{"detail": ...}`). Internal failure detail stays in the logs;
/// clients get a generic message.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            Error::Validation(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            Error::Auth(msg) => {
                (StatusCode::UNAUTHORIZED, (*msg).to_string())
            }
            Error::NotFound { .. } => {
                (StatusCode::NOT_FOUND, self.0.to_string())
            }
            Error::RetrievalUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "retrieval backend unavailable".to_string(),
            ),
            Error::Generation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "answer generation failed".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(json!({"detail": detail}))).into_response()
    }
}

pub fn router<E, G>(state: Arc<AppState<E, G>>) -> Router
where
    E: EmbeddingProvider + Send + Sync + 'static,
    G: AnswerGenerator + Send + Sync + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ask", post(ask::<E, G>))
        .route("/ingest", post(ingest::<E, G>))
        .route("/docs", get(docs_list::<E, G>))
        .route("/docs/{doc_id}", get(docs_get::<E, G>))
        .route("/feedback", post(feedback))
        .route(
            "/webhook",
            get(webhook::verify::<E, G>).post(webhook::inbound::<E, G>),
        )
        .with_state(state)
}

/// Reject a request whose x-api-key header doesn't match the configured
/// key. No key configured means the check is skipped entirely.
fn check_api_key(
    configured: Option<&str>,
    headers: &HeaderMap,
) -> Result<()> {
    let Some(expected) = configured else {
        return Ok(());
    };
    match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(provided) if provided == expected => Ok(()),
        _ => Err(Error::Auth("invalid API key")),
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn ask<E, G>(
    State(state): State<Arc<AppState<E, G>>>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> std::result::Result<Json<AskResponse>, ApiError>
where
    E: EmbeddingProvider + Send + Sync + 'static,
    G: AnswerGenerator + Send + Sync + 'static,
{
    check_api_key(state.api_key.as_deref(), &headers)?;
    Ok(Json(state.pipeline.ask(&request).await?))
}

async fn ingest<E, G>(
    State(state): State<Arc<AppState<E, G>>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> std::result::Result<Json<IngestResponse>, ApiError>
where
    E: EmbeddingProvider + Send + Sync + 'static,
    G: AnswerGenerator + Send + Sync + 'static,
{
    check_api_key(state.api_key.as_deref(), &headers)?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        Error::Validation(format!("unreadable multipart body: {e}"))
    })? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue; // not a file upload field
        };
        let bytes = field.bytes().await.map_err(|e| {
            Error::Validation(format!("failed to read upload {filename}: {e}"))
        })?;
        files.push((filename, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(Error::Validation("no files in upload".into()).into());
    }

    let report = ingest_batch(
        &state.store,
        state.pipeline.embedder(),
        &state.chunking,
        &files,
    )
    .await;

    Ok(Json(IngestResponse {
        upserted: report.upserted,
        errors: report.errors,
    }))
}

async fn docs_list<E, G>(
    State(state): State<Arc<AppState<E, G>>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError>
where
    E: EmbeddingProvider + Send + Sync + 'static,
    G: AnswerGenerator + Send + Sync + 'static,
{
    let docs = state.store.list_documents()?;
    Ok(Json(json!({"docs": docs})))
}

async fn docs_get<E, G>(
    State(state): State<Arc<AppState<E, G>>>,
    Path(doc_id): Path<String>,
) -> std::result::Result<Json<serde_json::Value>, ApiError>
where
    E: EmbeddingProvider + Send + Sync + 'static,
    G: AnswerGenerator + Send + Sync + 'static,
{
    match state.store.document(&doc_id)? {
        Some(info) => Ok(Json(json!(info))),
        None => Err(Error::NotFound {
            kind: "document",
            name: doc_id,
        }
        .into()),
    }
}

async fn feedback(
    Json(payload): Json<Feedback>,
) -> Json<serde_json::Value> {
    tracing::info!(
        answer_id = %payload.answer_id,
        helpful = payload.helpful,
        comment = payload.comment.as_deref().unwrap_or(""),
        "feedback received"
    );
    Json(json!({"status": "ok"}))
}
