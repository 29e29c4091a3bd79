//! Object storage offload for analysis output.
//!
//! When a bucket is configured the relay uploads each result instead of
//! inlining it in the forwarded payload, and hands the next hop a signed
//! read URL. The store itself is an opaque collaborator behind the
//! `ObjectStore` trait so tests can substitute an in-memory implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use serde_json::{Map, Value};

use crate::error::ServiceError;

/// Validity window for signed read URLs handed to the next hop.
const READ_URL_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `body` under `key` with the given content type and caller
    /// metadata, returning a URL the next hop can read the object from.
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<String, ServiceError>;
}

/// S3-backed store. Credentials and region come from the default AWS
/// provider chain.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    pub async fn new(bucket: &str, prefix: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.to_owned(),
            prefix: prefix.to_owned(),
        }
    }

    pub fn new_with_client(client: aws_sdk_s3::Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_owned(),
            prefix: prefix.to_owned(),
        }
    }

    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    fn storage_error(&self, key: &str, reason: impl ToString) -> ServiceError {
        ServiceError::Storage {
            key: key.to_owned(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<String, ServiceError> {
        let full_key = self.key(key);

        let object_metadata = metadata.map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let value = v
                        .as_str()
                        .map(str::to_owned)
                        .unwrap_or_else(|| v.to_string());
                    (k.clone(), value)
                })
                .collect::<HashMap<_, _>>()
        });

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .set_metadata(object_metadata)
            .send()
            .await
            .map_err(|err| self.storage_error(key, err))?;

        let presigning = PresigningConfig::expires_in(READ_URL_TTL)
            .map_err(|err| self.storage_error(key, err))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .presigned(presigning)
            .await
            .map_err(|err| self.storage_error(key, err))?;

        Ok(presigned.uri().to_string())
    }
}
