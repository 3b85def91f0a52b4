//! Cloud object store backend over the GCS JSON API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::ObjectStore;

/// Single-bucket blob store addressed through the storage JSON API.
pub struct GcsStore {
    client: Client,
    base_url: String,
    bucket: String,
    token: String,
}

impl GcsStore {
    pub fn new(base_url: &str, bucket: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
        }
    }

    fn download_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.base_url, self.bucket, key
        )
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url, self.bucket, key
        )
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn read(&self, key: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.download_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("gs://{}/{}", self.bucket, key)));
        }
        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "object store read {} failed: {}",
                key,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn write(&self, key: &str, value: &Value) -> Result<String> {
        let response = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&self.token)
            .header("content-type", "application/json")
            .body(serde_json::to_vec(value)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "object store write {} failed: {}",
                key,
                response.status()
            )));
        }

        let location = format!("gs://{}/{}", self.bucket, key);
        debug!(key, "Written to {}", location);
        Ok(location)
    }
}
