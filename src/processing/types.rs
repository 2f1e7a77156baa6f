//! Shared types for the ingestion and question-answering pipelines.

use crate::completion::CompletionError;
use crate::embedding::EmbeddingError;
use crate::supabase::StoreError;
use thiserror::Error;

/// Answer returned verbatim when retrieval finds no chunks above the
/// similarity threshold. The completion backend is never consulted in that
/// case.
pub const NO_MATCH_ANSWER: &str =
    "I couldn't find anything relevant to that question in the uploaded documents.";

/// Minimum accepted question length, in characters, after trimming.
pub const MIN_QUESTION_LEN: usize = 3;

/// Maximum accepted question length, in characters, after trimming.
pub const MAX_QUESTION_LEN: usize = 1200;

/// Number of characters of chunk content surfaced in a source reference.
pub const EXCERPT_CHARS: usize = 200;

/// Errors raised while ingesting an uploaded document.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The uploaded file is not a PDF.
    #[error("Only PDF files are supported.")]
    UnsupportedFileType,
    /// The uploaded file exceeds the configured size limit.
    #[error("File exceeds the {limit_bytes} byte upload limit.")]
    FileTooLarge {
        /// Configured upload limit in bytes.
        limit_bytes: usize,
    },
    /// Extraction produced no usable text, or no chunk survived filtering.
    #[error("No readable text found in PDF.")]
    NoReadableText,
    /// Embedding a chunk failed.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Persisting a specific chunk row failed.
    #[error("Failed to store chunk {chunk_index}: {source}")]
    ChunkInsert {
        /// Zero-based index of the chunk that failed to persist.
        chunk_index: usize,
        /// Underlying store error.
        source: StoreError,
    },
    /// Downloading the staged upload failed.
    #[error("Storage request failed: {0}")]
    Storage(#[from] StoreError),
}

impl IngestError {
    /// Whether the error is the caller's fault (bad upload) rather than a
    /// backend failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFileType | Self::FileTooLarge { .. } | Self::NoReadableText
        )
    }
}

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The question failed validation before any backend was contacted.
    #[error("{0}")]
    InvalidQuestion(String),
    /// Embedding the question failed.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    /// The nearest-neighbor query failed.
    #[error("Retrieval failed: {0}")]
    Store(#[from] StoreError),
    /// The completion backend failed.
    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),
}

/// Summary statistics for a completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Number of chunk rows written.
    pub chunk_count: usize,
    /// Number of pages in the source PDF.
    pub pages: usize,
    /// Mean chunk length in bytes, rounded down.
    pub avg_chunk_length: usize,
    /// Wall-clock processing time in milliseconds.
    pub elapsed_ms: u64,
}

/// Answer to a question, with the retrieved excerpts that grounded it.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    /// Model answer, or the fixed no-match fallback.
    pub answer: String,
    /// Retrieved chunks in descending similarity order. Empty when no chunk
    /// cleared the threshold.
    pub sources: Vec<SourceRef>,
}

/// A retrieved chunk surfaced to the caller as supporting evidence.
#[derive(Debug, Clone)]
pub struct SourceRef {
    /// Document title the chunk belongs to.
    pub title: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// Cosine similarity to the question, rounded to four decimal places.
    pub similarity: f32,
    /// First [`EXCERPT_CHARS`] characters of the chunk content.
    pub excerpt: String,
}

/// One indexed document, aggregated from its chunk rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    /// Document title (the original file name).
    pub title: String,
    /// Number of chunk rows stored for the document.
    pub chunks: usize,
    /// Most recent `created_at` among the document's rows, RFC3339.
    pub latest_upload_at: String,
}
