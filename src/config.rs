use crate::processing::chunking::DEFAULT_TARGET_SIZE;
use serde::Deserialize;
use std::env;
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

/// Runtime configuration for the Docchat server.
///
/// Loaded once at process start and handed to the service container by value;
/// nothing in the crate reads the environment after startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Supabase project backing row and object storage.
    pub supabase_url: String,
    /// Service-role key used for both PostgREST and storage requests.
    pub supabase_service_key: String,
    /// Bucket holding temporarily uploaded PDF files.
    pub upload_bucket: String,
    /// Optional OpenAI API key. When absent the deterministic hash embedding
    /// backend is used and completion calls will fail with an auth error.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Chat model used to answer questions.
    pub openai_chat_model: String,
    /// Embedding model used to vectorize chunks and questions.
    pub openai_embedding_model: String,
    /// Dimensionality of stored embedding vectors.
    pub embedding_dimension: usize,
    /// Target chunk size in characters for the paragraph packer.
    pub chunk_target_size: usize,
    /// Minimum cosine similarity for a stored chunk to count as relevant.
    pub match_threshold: f32,
    /// Number of nearest chunks requested from the store per question.
    pub match_count: usize,
    /// Maximum accepted size of an uploaded PDF in bytes.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            supabase_url: load_env("SUPABASE_URL")?,
            supabase_service_key: load_env("SUPABASE_SERVICE_ROLE_KEY")?,
            upload_bucket: load_env_optional("UPLOAD_BUCKET")
                .unwrap_or_else(|| "uploads".to_string()),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            openai_chat_model: load_env_optional("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_embedding_model: load_env_optional("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", 1536)?,
            chunk_target_size: parse_or("CHUNK_TARGET_SIZE", DEFAULT_TARGET_SIZE)?,
            match_threshold: parse_or("MATCH_THRESHOLD", 0.2)?,
            match_count: parse_or("MATCH_COUNT", 6)?,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}
