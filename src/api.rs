//! HTTP surface for the document chat server.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /upload` – Ingest a PDF already staged in the upload bucket: download it,
//!   extract and chunk its text, embed each chunk, and persist the rows. Returns a
//!   confirmation message plus ingestion stats (`chunks`, `pages`, `avgChunkLength`,
//!   `processingMs`).
//! - `POST /chat` – Answer a question against the indexed documents. Returns the
//!   answer and the retrieved source excerpts that grounded it.
//! - `GET /documents` – List indexed documents, most recently uploaded first.
//! - `DELETE /documents` – Remove every stored chunk belonging to a document.
//!
//! Validation failures come back as `400` with a caller-facing message; backend
//! failures come back as `500` with a generic message, the detail going to the logs.

use crate::processing::{ChatError, IngestError, ProcessingApi};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the document chat API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/upload", post(upload_document::<S>))
        .route("/chat", post(chat::<S>))
        .route(
            "/documents",
            get(list_documents::<S>).delete(delete_document::<S>),
        )
        .with_state(service)
}

/// Request body for the `POST /upload` endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    /// Original file name; becomes the document title.
    file_name: String,
    /// Path of the staged object inside the upload bucket.
    storage_path: String,
}

/// Ingestion statistics included in the upload response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadStats {
    chunks: usize,
    pages: usize,
    avg_chunk_length: usize,
    processing_ms: u64,
}

/// Success response for the `POST /upload` endpoint.
#[derive(Serialize)]
struct UploadResponse {
    message: String,
    stats: UploadStats,
}

/// Ingest a staged PDF upload.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: ProcessingApi,
{
    let file_name = request.file_name.trim();
    let storage_path = request.storage_path.trim();
    if file_name.is_empty() || storage_path.is_empty() {
        return Err(AppError::bad_request(
            "Both fileName and storagePath are required.",
        ));
    }

    let outcome = service.ingest_upload(file_name, storage_path).await?;
    tracing::info!(
        file_name,
        chunks = outcome.chunk_count,
        processing_ms = outcome.elapsed_ms,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        message: format!("Indexed {} chunks from {file_name}.", outcome.chunk_count),
        stats: UploadStats {
            chunks: outcome.chunk_count,
            pages: outcome.pages,
            avg_chunk_length: outcome.avg_chunk_length,
            processing_ms: outcome.elapsed_ms,
        },
    }))
}

/// Request body for the `POST /chat` endpoint.
#[derive(Deserialize)]
struct ChatRequest {
    /// Question to answer against the indexed documents.
    #[serde(default)]
    question: String,
}

/// One retrieved excerpt returned alongside the answer.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourcePayload {
    title: String,
    chunk_index: usize,
    similarity: f32,
    excerpt: String,
}

/// Success response for the `POST /chat` endpoint.
#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<SourcePayload>,
}

/// Answer a question against the indexed documents.
async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: ProcessingApi,
{
    let result = service.answer(&request.question).await?;
    Ok(Json(ChatResponse {
        answer: result.answer,
        sources: result
            .sources
            .into_iter()
            .map(|source| SourcePayload {
                title: source.title,
                chunk_index: source.chunk_index,
                similarity: source.similarity,
                excerpt: source.excerpt,
            })
            .collect(),
    }))
}

/// One indexed document in the listing response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPayload {
    title: String,
    chunks: usize,
    latest_upload_at: String,
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentPayload>,
}

/// List indexed documents.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: ProcessingApi,
{
    let documents = service.list_documents().await.map_err(|error| {
        tracing::error!(error = %error, "Failed to list documents");
        AppError::internal("Failed to list documents.")
    })?;

    Ok(Json(DocumentsResponse {
        documents: documents
            .into_iter()
            .map(|document| DocumentPayload {
                title: document.title,
                chunks: document.chunks,
                latest_upload_at: document.latest_upload_at,
            })
            .collect(),
    }))
}

/// Request body for `DELETE /documents`.
#[derive(Deserialize)]
struct DeleteRequest {
    /// Title of the document whose chunks should be removed.
    title: String,
}

/// Delete every stored chunk belonging to a document.
async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: ProcessingApi,
{
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("Document title is required."));
    }

    service.delete_document(title).await.map_err(|error| {
        tracing::error!(title, error = %error, "Failed to delete document");
        AppError::internal("Failed to delete document.")
    })?;

    Ok(Json(json!({ "message": format!("Deleted {title}.") })))
}

/// Error type bridging pipeline errors into HTTP responses.
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(error: IngestError) -> Self {
        if error.is_client_error() {
            Self::bad_request(&error.to_string())
        } else {
            tracing::error!(error = %error, "Upload processing failed");
            Self::internal("Failed to process PDF.")
        }
    }
}

impl From<ChatError> for AppError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::InvalidQuestion(message) => Self::bad_request(&message),
            other => {
                tracing::error!(error = %other, "Chat request failed");
                Self::internal("Failed to answer question.")
            }
        }
    }
}
