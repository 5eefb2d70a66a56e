use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{LongformError, Result};

/// Content-addressed object store consumed by the engine. Paths are stable
/// and query-string free; signed URLs derived from them expire.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<()>;
    async fn sign(&self, path: &str, ttl: Duration) -> Result<String>;
    async fn exists(&self, path: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    url: String,
}

/// HTTP-backed blob store client, authenticated with the shared service
/// secret.
pub struct HttpBlobStore {
    http: reqwest::Client,
    base_url: String,
    service_secret: String,
}

impl HttpBlobStore {
    pub fn new(base_url: String, service_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_secret,
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/objects/{}", self.base_url, path)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<()> {
        let response = self
            .http
            .put(self.object_url(path))
            .bearer_auth(&self.service_secret)
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LongformError::Transient(format!(
                "blob put {} returned {}",
                path,
                response.status()
            )));
        }
        Ok(())
    }

    async fn sign(&self, path: &str, ttl: Duration) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/sign", self.base_url))
            .bearer_auth(&self.service_secret)
            .json(&serde_json::json!({ "path": path, "ttl_secs": ttl.as_secs() }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LongformError::Transient(format!(
                "blob sign {} returned {}",
                path,
                response.status()
            )));
        }
        let body: SignResponse = response.json().await?;
        Ok(body.url)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self
            .http
            .head(self.object_url(path))
            .bearer_auth(&self.service_secret)
            .send()
            .await?;
        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            other => Err(LongformError::Transient(format!(
                "blob head {} returned {}",
                path, other
            ))),
        }
    }
}
