//! Object store access bound to a single bucket.
//!
//! Implementations:
//! - [`S3ObjectStore`]: production, backed by `aws-sdk-s3`
//! - [`InMemoryObjectStore`]: ordered in-memory map for tests, with fault injection

use crate::partition::ObjectDescriptor;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors returned by object store operations
#[derive(Error, Debug, Clone)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Failed to {operation} {key}: {message}")]
    Transport {
        operation: &'static str,
        key: String,
        message: String,
    },
}

impl ObjectStoreError {
    fn transport(operation: &'static str, key: &str, message: impl ToString) -> Self {
        ObjectStoreError::Transport {
            operation,
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Bucket-scoped object store operations
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this handle operates on
    fn bucket(&self) -> &str;

    /// List every object under `prefix`, following pagination
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, ObjectStoreError>;

    /// Download an object's full content
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    /// Upload (create or overwrite) an object
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str)
        -> Result<(), ObjectStoreError>;
}

/// S3 connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding raw and flattened objects
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "ap-southeast-2".to_string()
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store handle
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }

    /// Get the underlying S3 client
    pub fn client(&self) -> &S3Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, ObjectStoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page
                .map_err(|e| ObjectStoreError::transport("list", prefix, DisplayErrorContext(e)))?;

            for object in page.contents() {
                if let Some(key) = object.key() {
                    let size = object.size().unwrap_or_default().max(0) as u64;
                    objects.push(ObjectDescriptor::new(key, size));
                }
            }
        }

        debug!(prefix = %prefix, objects = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    ObjectStoreError::transport("download", key, DisplayErrorContext(e))
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::transport("read", key, e))?;

        Ok(data.into_bytes())
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket, size_bytes = body.len()))]
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ObjectStoreError::transport("upload", key, DisplayErrorContext(e)))?;

        debug!(key = %key, "Object uploaded");
        Ok(())
    }
}

/// In-memory object store listing keys in lexicographic order
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, (Bytes, String)>>,
    failing_keys: RwLock<HashSet<String>>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Store an object directly, bypassing fault injection
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(
            key.into(),
            (data.into(), "application/octet-stream".to_string()),
        );
    }

    /// Make every later `get` and `put` of `key` fail with a transport error
    pub fn fail_on(&self, key: impl Into<String>) {
        self.failing_keys.write().insert(key.into());
    }

    /// Content of a stored object
    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|(data, _)| data.clone())
    }

    /// Content type recorded for a stored object
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().get(key).map(|(_, ct)| ct.clone())
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    fn check_fault(&self, operation: &'static str, key: &str) -> Result<(), ObjectStoreError> {
        if self.failing_keys.read().contains(key) {
            return Err(ObjectStoreError::transport(
                operation,
                key,
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, ObjectStoreError> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (data, _))| ObjectDescriptor::new(key.clone(), data.len() as u64))
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.check_fault("download", key)?;
        self.contents(key)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.check_fault("upload", key)?;
        self.objects.write().insert(
            key.to_string(),
            (Bytes::from(body), content_type.to_string()),
        );
        Ok(())
    }
}

/// One download attempt, paired with the key it was made for
#[derive(Debug, Clone)]
pub struct FetchedObject {
    /// Position of `key` in the requested key list
    pub index: usize,
    pub key: String,
    pub result: Result<Bytes, ObjectStoreError>,
}

/// Download `keys` with at most `concurrency` requests in flight.
///
/// Every key gets its own result and a failed download never cancels the
/// others. Results arrive in completion order; sort by
/// [`FetchedObject::index`] to restore the requested order.
pub async fn fetch_all<S>(store: &S, keys: Vec<String>, concurrency: usize) -> Vec<FetchedObject>
where
    S: ObjectStore + ?Sized,
{
    stream::iter(keys.into_iter().enumerate())
        .map(move |(index, key)| async move {
            let result = store.get(&key).await;
            FetchedObject { index, key, result }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
