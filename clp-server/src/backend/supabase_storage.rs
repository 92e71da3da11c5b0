//! Supabase Storage bucket client

use async_trait::async_trait;
use reqwest::Url;
use serde_json::json;
use tracing::debug;

use super::supabase::{check, SupabaseClient};
use super::{BackendError, BackendResult, ObjectStore};

pub struct SupabaseStorage {
    client: SupabaseClient,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(client: SupabaseClient, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Object endpoint with each key segment percent-encoded
    fn object_url(&self, path: &str) -> BackendResult<Url> {
        let mut url = Url::parse(&self.client.storage_url("object"))
            .map_err(|e| BackendError::InvalidInput(format!("Invalid storage URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidInput("Storage URL cannot take a path".to_string()))?
            .push(&self.bucket)
            .extend(
                path.split('/')
                    .filter(|segment| !matches!(*segment, "" | "." | "..")),
            );
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> BackendResult<()> {
        debug!(bucket = %self.bucket, path, size = bytes.len(), upsert, "Storage upload");
        let request = self
            .client
            .http()
            .post(self.object_url(path)?)
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes);
        let response = self.client.as_service(request).send().await?;
        match check(response).await {
            Ok(_) => Ok(()),
            // Storage reports an existing object as 400 "Duplicate"
            Err(BackendError::InvalidInput(message)) if message.contains("Duplicate") => {
                Err(BackendError::Conflict(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn download(&self, path: &str) -> BackendResult<Vec<u8>> {
        debug!(bucket = %self.bucket, path, "Storage download");
        let request = self.client.http().get(self.object_url(path)?);
        let response = match check(self.client.as_service(request).send().await?).await {
            Ok(response) => response,
            Err(BackendError::InvalidInput(message)) if message.contains("not found") => {
                return Err(BackendError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e),
        };
        Ok(response.bytes().await?.to_vec())
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        debug!(bucket = %self.bucket, ?paths, "Storage remove");
        let request = self
            .client
            .http()
            .delete(self.client.storage_url(&format!("object/{}", self.bucket)))
            .json(&json!({ "prefixes": paths }));
        check(self.client.as_service(request).send().await?).await?;
        Ok(())
    }
}
