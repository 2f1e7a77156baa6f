//! Embedding client abstraction and adapters.
//!
//! Two backends implement [`EmbeddingClient`]:
//!
//! - [`OpenAiEmbeddingClient`] calls the hosted embeddings API. Errors are
//!   classified (auth, rate limit, upstream) but never retried here; the
//!   caller decides what each class means for its pipeline.
//! - [`HashEmbeddingClient`] is a deterministic bag-of-words fallback used
//!   when no API key is configured and in offline tests. Retrieval degrades
//!   to term-frequency cosine similarity, but every call is reproducible and
//!   needs no network.
//!
//! All vectors stored in one index must come from the same backend and
//! dimension; mixing backends produces meaningless similarity scores.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding backends.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Credentials were rejected by the provider.
    #[error("Embedding provider rejected credentials ({status})")]
    Auth {
        /// HTTP status returned by the provider.
        status: StatusCode,
    },
    /// Provider throttled the request.
    #[error("Embedding provider rate limited the request: {body}")]
    RateLimited {
        /// Body payload associated with the throttled response.
        body: String,
    },
    /// Provider returned an unexpected status code.
    #[error("Unexpected embedding response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider response did not contain a usable vector.
    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce a fixed-dimension embedding vector for the supplied text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimensionality of the vectors this backend produces.
    fn dimension(&self) -> usize;
}

/// Select an embedding backend for the current configuration.
///
/// The remote backend is used when an API key is present; otherwise the
/// deterministic hash fallback is installed and a warning is logged, since
/// retrieval quality drops to bag-of-words matching.
pub fn build_embedding_client(config: &Config) -> Arc<dyn EmbeddingClient> {
    match &config.openai_api_key {
        Some(api_key) => Arc::new(OpenAiEmbeddingClient::new(
            &config.openai_base_url,
            api_key,
            &config.openai_embedding_model,
            config.embedding_dimension,
        )),
        None => {
            tracing::warn!(
                dimension = config.embedding_dimension,
                "No embedding API key configured; using deterministic hash fallback"
            );
            Arc::new(HashEmbeddingClient::new(config.embedding_dimension))
        }
    }
}

// ---------------------------------------------------------------------------
// Remote backend
// ---------------------------------------------------------------------------

/// Embedding client backed by the OpenAI embeddings endpoint.
pub struct OpenAiEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Construct a remote embedding client.
    pub fn new(base_url: &str, api_key: &str, model: &str, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EmbeddingError::Auth { status });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RateLimited { body });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus { status, body });
        }

        let payload: EmbeddingsResponse = response.json().await?;
        let vector = payload
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| EmbeddingError::MalformedResponse("empty data array".to_string()))?;

        if vector.len() != self.dimension {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected dimension {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ---------------------------------------------------------------------------
// Deterministic fallback backend
// ---------------------------------------------------------------------------

/// Deterministic term-frequency embedding backend.
///
/// Tokens are folded (lowercased, diacritics stripped), hashed with 32-bit
/// FNV-1a into a vector slot, counted, and the vector is L2-normalized.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a fallback client producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in fold_text(text).split(|c: char| !c.is_ascii_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let slot = fnv1a32(token) as usize % self.dimension;
            vector[slot] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        // all-zero vectors (empty or punctuation-only input) pass through unchanged

        vector
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.encode(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 32-bit FNV-1a hash over the token bytes.
fn fnv1a32(token: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in token.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Lowercase and strip common Latin diacritics so accented variants of a
/// token land in the same vector slot.
fn fold_text(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(fold_char)
        .collect()
}

fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}
