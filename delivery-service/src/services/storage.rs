/// Object store access for raw manifest text
///
/// The store is an external collaborator: the core only needs
/// `get(key) -> bytes | not-found`. The S3 implementation mirrors the
/// path-style, credential-from-config client setup used for
/// S3-compatible storage.
use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::collections::HashMap;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build an S3 client from storage configuration.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        use aws_sdk_s3::config::{Credentials, Region};

        let region = config.region.clone().unwrap_or_else(|| "auto".to_string());
        let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region));

        // Explicit credentials when provided; default chain otherwise.
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "delivery_service_storage",
            );
            aws_config_builder = aws_config_builder.credentials_provider(credentials);
        }

        if let Some(endpoint) = storage_endpoint(config) {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }
}

fn storage_endpoint(config: &StorageConfig) -> Option<String> {
    if let Some(endpoint) = &config.endpoint {
        return Some(endpoint.clone());
    }
    config
        .account_id
        .as_ref()
        .map(|account_id| format!("https://{}.r2.cloudflarestorage.com", account_id))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => {
                let body = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::Storage(format!("failed to read object body: {e}")))?;
                Ok(Some(body.into_bytes()))
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("NoSuchKey") || message.contains("404") {
                    Ok(None)
                } else {
                    Err(AppError::Storage(format!("failed to fetch object: {e}")))
                }
            }
        }
    }
}

/// In-memory object store for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: HashMap<String, Bytes>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, body: &str) {
        self.objects
            .insert(key.to_string(), Bytes::from(body.to_string()));
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.objects.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> StorageConfig {
        StorageConfig {
            bucket: "media-objects".to_string(),
            region: Some("auto".to_string()),
            access_key_id: None,
            secret_access_key: None,
            account_id: Some("f00dfeed".to_string()),
            endpoint: None,
            public_base_url: "https://media.example.com".to_string(),
        }
    }

    #[test]
    fn test_endpoint_derived_from_account_id() {
        assert_eq!(
            storage_endpoint(&base_config()).as_deref(),
            Some("https://f00dfeed.r2.cloudflarestorage.com")
        );
    }

    #[test]
    fn test_explicit_endpoint_wins() {
        let mut config = base_config();
        config.endpoint = Some("http://localhost:9000".to_string());
        assert_eq!(
            storage_endpoint(&config).as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[tokio::test]
    async fn test_memory_store_miss_is_none() {
        let store = MemoryObjectStore::new();
        assert!(store.get("absent").await.unwrap().is_none());
    }
}
