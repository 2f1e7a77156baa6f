//! HTTP client wrapper for the Supabase PostgREST surface.
//!
//! Chunk rows live in a single `documents` table with a pgvector `embedding`
//! column; nearest-neighbor search is exposed by the store through a
//! `match_documents` RPC that filters by similarity threshold and ranks by
//! descending similarity. The client here is deliberately thin: it shapes
//! requests, attaches credentials, and classifies non-success responses.

use crate::supabase::types::{ChunkRowMeta, MatchedChunk, NewChunkRow, StoreError};
use reqwest::{Client, Method};
use serde_json::json;

/// Lightweight HTTP client for the chunk row store.
pub struct SupabaseService {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseService {
    /// Construct a new client for the given project URL and service-role key.
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("docchat/0.1").build()?;
        let base_url = normalize_base_url(base_url)?;
        tracing::debug!(url = %base_url, "Initialized Supabase HTTP client");

        Ok(Self {
            client,
            base_url,
            service_key: service_key.to_string(),
        })
    }

    /// Insert a single chunk row, keyed by `(title, chunk_index)`.
    pub async fn insert_chunk(&self, row: &NewChunkRow) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, "rest/v1/documents")
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(title = %row.title, chunk_index = row.chunk_index, "Chunk row inserted");
        })
        .await
    }

    /// Run the store-side nearest-neighbor query.
    ///
    /// Rows come back pre-filtered by `threshold` and ordered by descending
    /// similarity; no client-side re-filtering is applied.
    pub async fn match_chunks(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<MatchedChunk>, StoreError> {
        let body = json!({
            "query_embedding": query_embedding,
            "match_threshold": threshold,
            "match_count": count,
        });

        let response = self
            .request(Method::POST, "rest/v1/rpc/match_documents")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Vector match query failed");
            return Err(error);
        }

        let rows: Vec<MatchedChunk> = response.json().await?;
        Ok(rows)
    }

    /// Fetch `(title, created_at)` for every chunk row, newest first.
    pub async fn list_chunk_rows(&self) -> Result<Vec<ChunkRowMeta>, StoreError> {
        let response = self
            .request(Method::GET, "rest/v1/documents")
            .query(&[("select", "title,created_at"), ("order", "created_at.desc")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list chunk rows");
            return Err(error);
        }

        let rows: Vec<ChunkRowMeta> = response.json().await?;
        Ok(rows)
    }

    /// Delete every chunk row belonging to `title`.
    pub async fn delete_by_title(&self, title: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, "rest/v1/documents")
            .query(&[("title", format!("eq.{title}"))])
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(title, "Chunk rows deleted");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Supabase request failed");
            Err(error)
        }
    }
}

/// Validate the scheme and strip any trailing slash from the project URL.
pub(crate) fn normalize_base_url(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(StoreError::InvalidUrl(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            normalize_base_url("https://proj.supabase.co/").unwrap(),
            "https://proj.supabase.co"
        );
        assert!(normalize_base_url("proj.supabase.co").is_err());
    }
}
