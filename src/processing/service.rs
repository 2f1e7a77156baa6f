//! Pipeline orchestration.
//!
//! [`ProcessingService`] owns the backend clients and drives both pipelines:
//! ingestion (download, extract, chunk, embed, store, release the staged
//! upload) and question answering (validate, embed, retrieve, compose
//! context, complete). Handlers depend on the [`ProcessingApi`] trait rather
//! than the concrete service so tests can substitute a stub.

use crate::completion::{CompletionClient, OpenAiCompletionClient};
use crate::config::Config;
use crate::embedding::{EmbeddingClient, build_embedding_client};
use crate::processing::chunking::chunk_text;
use crate::processing::extract::extract_pdf_text;
use crate::processing::types::{
    ChatAnswer, ChatError, DocumentSummary, EXCERPT_CHARS, IngestError, IngestOutcome,
    MAX_QUESTION_LEN, MIN_QUESTION_LEN, NO_MATCH_ANSWER, SourceRef,
};
use crate::supabase::{
    ChunkRowMeta, MatchedChunk, NewChunkRow, ObjectStorage, StoreError, SupabaseService,
};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Number of chunks embedded and inserted concurrently per batch.
const EMBED_BATCH_WIDTH: usize = 10;

/// Delimiter between retrieved excerpts in the completion context.
const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Operations the HTTP layer needs from the pipeline.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Ingest a staged upload: download it, index its text, and release the
    /// staged object.
    async fn ingest_upload(
        &self,
        file_name: &str,
        storage_path: &str,
    ) -> Result<IngestOutcome, IngestError>;

    /// Answer a question against the indexed documents.
    async fn answer(&self, question: &str) -> Result<ChatAnswer, ChatError>;

    /// List indexed documents, most recently uploaded first.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError>;

    /// Delete every chunk row belonging to `title`.
    async fn delete_document(&self, title: &str) -> Result<(), StoreError>;
}

/// Concrete pipeline implementation backed by Supabase and an embedding and
/// completion provider.
pub struct ProcessingService {
    config: Config,
    embedding: Arc<dyn EmbeddingClient>,
    completion: Arc<dyn CompletionClient>,
    store: SupabaseService,
    storage: ObjectStorage,
}

impl ProcessingService {
    /// Build the service and its backend clients from configuration.
    ///
    /// Panics if a client cannot be constructed; this runs once at startup
    /// and a service without working clients cannot do anything useful.
    pub fn new(config: Config) -> Self {
        let embedding = build_embedding_client(&config);
        let completion: Arc<dyn CompletionClient> = Arc::new(
            OpenAiCompletionClient::new(
                &config.openai_base_url,
                config.openai_api_key.as_deref(),
                &config.openai_chat_model,
            )
            .expect("Failed to build completion client"),
        );
        let store = SupabaseService::new(&config.supabase_url, &config.supabase_service_key)
            .expect("Failed to build Supabase client");
        let storage = ObjectStorage::new(
            &config.supabase_url,
            &config.supabase_service_key,
            &config.upload_bucket,
        )
        .expect("Failed to build storage client");

        Self {
            config,
            embedding,
            completion,
            store,
            storage,
        }
    }

    /// Index already-extracted text under `title`.
    ///
    /// Chunks are embedded and inserted in batches of [`EMBED_BATCH_WIDTH`]
    /// concurrent tasks; the first failure aborts the remaining batches.
    pub async fn ingest_text(
        &self,
        title: &str,
        text: &str,
        pages: usize,
    ) -> Result<IngestOutcome, IngestError> {
        let started = Instant::now();

        let chunks = chunk_text(text, self.config.chunk_target_size);
        if chunks.is_empty() {
            return Err(IngestError::NoReadableText);
        }

        let total_length: usize = chunks.iter().map(String::len).sum();

        for (batch_number, batch) in chunks.chunks(EMBED_BATCH_WIDTH).enumerate() {
            let tasks = batch.iter().enumerate().map(|(offset, content)| {
                let chunk_index = batch_number * EMBED_BATCH_WIDTH + offset;
                self.index_chunk(title, chunk_index, content)
            });
            for result in join_all(tasks).await {
                result?;
            }
        }

        let outcome = IngestOutcome {
            chunk_count: chunks.len(),
            pages,
            avg_chunk_length: total_length / chunks.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            title,
            chunks = outcome.chunk_count,
            pages = outcome.pages,
            elapsed_ms = outcome.elapsed_ms,
            "Document indexed"
        );
        Ok(outcome)
    }

    async fn index_chunk(
        &self,
        title: &str,
        chunk_index: usize,
        content: &str,
    ) -> Result<(), IngestError> {
        let embedding = self.embedding.embed(content).await?;
        let row = NewChunkRow {
            title: title.to_string(),
            chunk_index,
            content: content.to_string(),
            embedding,
            created_at: current_timestamp(),
        };
        self.store
            .insert_chunk(&row)
            .await
            .map_err(|source| IngestError::ChunkInsert {
                chunk_index,
                source,
            })
    }

    /// Remove the staged upload object, logging on failure.
    ///
    /// Release is best-effort: a failure here must never mask the outcome of
    /// the ingestion itself.
    async fn release_artifact(&self, storage_path: &str) {
        if let Err(error) = self.storage.remove(storage_path).await {
            tracing::warn!(storage_path, error = %error, "Failed to remove staged upload");
        }
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn ingest_upload(
        &self,
        file_name: &str,
        storage_path: &str,
    ) -> Result<IngestOutcome, IngestError> {
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            return Err(IngestError::UnsupportedFileType);
        }

        let bytes = self.storage.download(storage_path).await?;

        // From here on the staged object exists and must be released no
        // matter how ingestion turns out.
        let result = async {
            if bytes.len() > self.config.max_upload_bytes {
                return Err(IngestError::FileTooLarge {
                    limit_bytes: self.config.max_upload_bytes,
                });
            }

            let extracted = extract_pdf_text(&bytes).map_err(|error| {
                tracing::warn!(file_name, error = %error, "PDF text extraction failed");
                IngestError::NoReadableText
            })?;

            self.ingest_text(file_name, &extracted.text, extracted.pages)
                .await
        }
        .await;

        self.release_artifact(storage_path).await;
        result
    }

    async fn answer(&self, question: &str) -> Result<ChatAnswer, ChatError> {
        let question = validate_question(question)?;

        let query_embedding = self.embedding.embed(question).await?;
        let rows = self
            .store
            .match_chunks(
                &query_embedding,
                self.config.match_threshold,
                self.config.match_count,
            )
            .await?;

        if rows.is_empty() {
            tracing::info!("No chunks cleared the similarity threshold");
            return Ok(ChatAnswer {
                answer: NO_MATCH_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = build_context(&rows);
        let answer = self.completion.complete(question, &context).await?;
        let sources = rows.into_iter().map(to_source).collect();

        Ok(ChatAnswer { answer, sources })
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let rows = self.store.list_chunk_rows().await?;
        Ok(group_documents(rows))
    }

    async fn delete_document(&self, title: &str) -> Result<(), StoreError> {
        self.store.delete_by_title(title).await?;
        tracing::info!(title, "Document deleted");
        Ok(())
    }
}

/// Trim and length-check a question before any backend is contacted.
///
/// Bounds are counted in characters, not bytes, so multibyte questions are
/// measured the way a caller would.
fn validate_question(question: &str) -> Result<&str, ChatError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidQuestion("Question is required.".to_string()));
    }
    let length = trimmed.chars().count();
    if length < MIN_QUESTION_LEN {
        return Err(ChatError::InvalidQuestion(
            "Question is too short.".to_string(),
        ));
    }
    if length > MAX_QUESTION_LEN {
        return Err(ChatError::InvalidQuestion(format!(
            "Question must be at most {MAX_QUESTION_LEN} characters."
        )));
    }
    Ok(trimmed)
}

/// Compose the labeled, delimiter-separated context block handed to the
/// completion backend.
fn build_context(rows: &[MatchedChunk]) -> String {
    rows.iter()
        .enumerate()
        .map(|(position, row)| {
            format!(
                "[Source {}] {} (chunk {}, score {:.3})\n{}",
                position + 1,
                row.title,
                row.chunk_index,
                row.similarity,
                row.content
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

fn to_source(row: MatchedChunk) -> SourceRef {
    SourceRef {
        title: row.title,
        chunk_index: row.chunk_index,
        similarity: (row.similarity * 10_000.0).round() / 10_000.0,
        excerpt: truncate_chars(&row.content, EXCERPT_CHARS),
    }
}

/// Truncate to at most `limit` characters, respecting char boundaries.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Aggregate per-chunk rows into one summary per title.
///
/// Rows arrive newest-first, so the resulting order puts the most recently
/// uploaded document first.
fn group_documents(rows: Vec<ChunkRowMeta>) -> Vec<DocumentSummary> {
    let mut summaries: Vec<DocumentSummary> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows {
        match positions.get(&row.title) {
            Some(&position) => {
                let summary = &mut summaries[position];
                summary.chunks += 1;
                if row.created_at > summary.latest_upload_at {
                    summary.latest_upload_at = row.created_at;
                }
            }
            None => {
                positions.insert(row.title.clone(), summaries.len());
                summaries.push(DocumentSummary {
                    title: row.title,
                    chunks: 1,
                    latest_upload_at: row.created_at,
                });
            }
        }
    }

    summaries
}

fn current_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str, created_at: &str) -> ChunkRowMeta {
        ChunkRowMeta {
            title: title.to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn question_validation_rejects_empty_and_extreme_lengths() {
        assert!(matches!(
            validate_question("   "),
            Err(ChatError::InvalidQuestion(message)) if message == "Question is required."
        ));
        assert!(matches!(
            validate_question("hi"),
            Err(ChatError::InvalidQuestion(_))
        ));
        let oversized = "q".repeat(MAX_QUESTION_LEN + 1);
        assert!(matches!(
            validate_question(&oversized),
            Err(ChatError::InvalidQuestion(_))
        ));
    }

    #[test]
    fn question_validation_trims_whitespace() {
        assert_eq!(validate_question("  why?  ").unwrap(), "why?");
    }

    #[test]
    fn question_bounds_are_counted_in_characters() {
        let at_limit = "é".repeat(MAX_QUESTION_LEN);
        assert!(validate_question(&at_limit).is_ok());

        let over_limit = "é".repeat(MAX_QUESTION_LEN + 1);
        assert!(matches!(
            validate_question(&over_limit),
            Err(ChatError::InvalidQuestion(_))
        ));

        // three characters, more than three bytes
        assert!(validate_question("где").is_ok());
    }

    #[test]
    fn context_labels_sources_in_rank_order() {
        let rows = vec![
            MatchedChunk {
                title: "guide.pdf".to_string(),
                chunk_index: 4,
                content: "First excerpt.".to_string(),
                similarity: 0.91,
            },
            MatchedChunk {
                title: "notes.pdf".to_string(),
                chunk_index: 0,
                content: "Second excerpt.".to_string(),
                similarity: 0.4567,
            },
        ];

        let context = build_context(&rows);
        let blocks: Vec<&str> = context.split(CONTEXT_DELIMITER).collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("[Source 1] guide.pdf (chunk 4, score 0.910)"));
        assert!(blocks[0].ends_with("First excerpt."));
        assert!(blocks[1].starts_with("[Source 2] notes.pdf (chunk 0, score 0.457)"));
    }

    #[test]
    fn source_excerpts_are_truncated_on_char_boundaries() {
        let long = "é".repeat(EXCERPT_CHARS + 50);
        let source = to_source(MatchedChunk {
            title: "t.pdf".to_string(),
            chunk_index: 0,
            content: long,
            similarity: 0.5,
        });
        assert_eq!(source.excerpt.chars().count(), EXCERPT_CHARS);
    }

    #[test]
    fn similarity_is_rounded_to_four_places() {
        let source = to_source(MatchedChunk {
            title: "t.pdf".to_string(),
            chunk_index: 0,
            content: "x".to_string(),
            similarity: 0.123_456,
        });
        assert!((source.similarity - 0.1235).abs() < 1e-6);
    }

    #[test]
    fn documents_group_by_title_preserving_recency_order() {
        let rows = vec![
            meta("b.pdf", "2026-08-02T10:00:00Z"),
            meta("a.pdf", "2026-08-01T12:00:00Z"),
            meta("b.pdf", "2026-08-02T09:59:00Z"),
            meta("a.pdf", "2026-08-01T11:00:00Z"),
            meta("a.pdf", "2026-08-01T10:00:00Z"),
        ];

        let summaries = group_documents(rows);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].title, "b.pdf");
        assert_eq!(summaries[0].chunks, 2);
        assert_eq!(summaries[0].latest_upload_at, "2026-08-02T10:00:00Z");
        assert_eq!(summaries[1].title, "a.pdf");
        assert_eq!(summaries[1].chunks, 3);
        assert_eq!(summaries[1].latest_upload_at, "2026-08-01T12:00:00Z");
    }

    #[test]
    fn grouping_empty_rows_yields_no_documents() {
        assert!(group_documents(Vec::new()).is_empty());
    }
}
