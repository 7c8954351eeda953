use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use moodframe_contracts::images::extension_for_mime;
use sha2::{Digest, Sha256};

use crate::{Error, KeyNamespace, ObjectStore, Result, StoredImage};

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// S3-compatible endpoint; switches to path-style addressing.
    pub endpoint_url: Option<String>,
    pub public_base_url: Option<String>,
    pub timeout: Duration,
}

impl S3Settings {
    pub fn public_url(&self, key: &str) -> String {
        if let Some(base) = non_empty(self.public_base_url.as_deref()) {
            return format!("{}/{}", base.trim_end_matches('/'), key);
        }
        if let Some(endpoint) = non_empty(self.endpoint_url.as_deref()) {
            return format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key);
        }
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}

pub struct S3ObjectStore {
    client: S3Client,
    settings: S3Settings,
}

impl S3ObjectStore {
    pub fn new(settings: S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "moodframe-env",
        );
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(settings.timeout)
                    .build(),
            );
        if let Some(endpoint) = non_empty(settings.endpoint_url.as_deref()) {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: S3Client::from_conf(builder.build()),
            settings,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.settings.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        namespace: KeyNamespace,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredImage> {
        let key = namespace.object_key(extension_for_mime(content_type));
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let size = bytes.len();
        let started = Instant::now();

        self.client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| Error::Storage(DisplayErrorContext(&err).to_string()))?;

        tracing::info!(
            bucket = %self.settings.bucket,
            key = %key,
            size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stored object"
        );
        Ok(StoredImage {
            url: self.settings.public_url(&key),
            key,
            content_type: content_type.to_string(),
            sha256,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct StoredObject {
        pub bytes: Vec<u8>,
        pub content_type: String,
    }

    /// In-process store publishing objects under a fake bucket host.
    #[derive(Debug, Default)]
    pub struct MemoryObjectStore {
        objects: Mutex<BTreeMap<String, StoredObject>>,
        puts: AtomicUsize,
        fail_writes: AtomicBool,
    }

    impl MemoryObjectStore {
        pub const BASE_URL: &'static str = "https://memory.test";

        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            let store = Self::default();
            store.fail_writes.store(true, Ordering::SeqCst);
            store
        }

        pub fn put_count(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }

        /// Resolves a public URL back to the stored object.
        pub fn resolve(&self, url: &str) -> Option<StoredObject> {
            let key = url.strip_prefix(Self::BASE_URL)?.strip_prefix('/')?;
            self.objects.lock().ok()?.get(key).cloned()
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects
                .lock()
                .map(|objects| objects.keys().cloned().collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn put(
            &self,
            namespace: KeyNamespace,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<StoredImage> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Storage("memory store configured to fail".to_string()));
            }
            let key = namespace.object_key(extension_for_mime(content_type));
            let sha256 = hex::encode(Sha256::digest(&bytes));
            let mut objects = self
                .objects
                .lock()
                .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
            if objects.contains_key(&key) {
                return Err(Error::Storage(format!("key collision on {key}")));
            }
            objects.insert(
                key.clone(),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
            Ok(StoredImage {
                url: format!("{}/{}", Self::BASE_URL, key),
                key,
                content_type: content_type.to_string(),
                sha256,
            })
        }
    }
}
