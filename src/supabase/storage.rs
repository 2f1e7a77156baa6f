//! Object storage client for temporarily held uploads.
//!
//! Uploaded PDFs are staged in a storage bucket by the frontend before the
//! server is asked to ingest them. The server downloads the object, and
//! removes it once ingestion finishes (or fails); removal is best-effort at
//! the call sites, so failures here are surfaced but never fatal upstream.

use crate::supabase::client::normalize_base_url;
use crate::supabase::types::StoreError;
use reqwest::{Client, Method};

/// Lightweight HTTP client for the upload bucket.
pub struct ObjectStorage {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl ObjectStorage {
    /// Construct a new client for the given project URL, key, and bucket.
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("docchat/0.1").build()?;
        let base_url = normalize_base_url(base_url)?;

        Ok(Self {
            client,
            base_url,
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    /// Download the raw bytes of a staged object.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let response = self.request(Method::GET, path).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(path, error = %error, "Failed to download upload artifact");
            return Err(error);
        }

        let bytes = response.bytes().await?;
        tracing::debug!(path, size = bytes.len(), "Downloaded upload artifact");
        Ok(bytes.to_vec())
    }

    /// Remove a staged object.
    pub async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let response = self.request(Method::DELETE, path).send().await?;

        if response.status().is_success() {
            tracing::debug!(path, "Removed upload artifact");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::UnexpectedStatus { status, body })
        }
    }

    fn request(&self, method: Method, object_path: &str) -> reqwest::RequestBuilder {
        let path = object_path.trim_start_matches('/');
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}
