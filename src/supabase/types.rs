//! Shared types used by the Supabase clients.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned while interacting with Supabase.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Supabase URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Supabase responded with an unexpected status code.
    #[error("Unexpected Supabase response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Supabase.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Chunk row submitted to the `documents` table.
///
/// Rows are immutable once written: the pipeline only inserts and deletes,
/// never updates in place.
#[derive(Debug, Clone, Serialize)]
pub struct NewChunkRow {
    /// Document title (the original file name).
    pub title: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// Chunk text content.
    pub content: String,
    /// Embedding vector produced for the chunk.
    pub embedding: Vec<f32>,
    /// Insertion timestamp, RFC3339.
    pub created_at: String,
}

/// Ranked row returned by the `match_documents` RPC.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchedChunk {
    /// Document title the chunk belongs to.
    pub title: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// Chunk text content.
    pub content: String,
    /// Cosine similarity to the query embedding, in `[0, 1]`.
    pub similarity: f32,
}

/// Minimal projection of a chunk row used for the documents listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRowMeta {
    /// Document title the chunk belongs to.
    pub title: String,
    /// Insertion timestamp, RFC3339.
    pub created_at: String,
}
