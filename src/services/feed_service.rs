//! src/services/feed_service.rs
//!
//! FeedService — resolves the feed bucket from the parameter store and reads
//! the requested object. Validation happens in a fixed order: filename,
//! configuration, bucket lookup, object metadata, then either the entity tag
//! or the size check followed by the body read. Every step is a single
//! attempt; failures surface immediately.

use crate::{
    models::{
        feed_location::{FeedLocation, LocationError},
        object::ObjectBody,
    },
    services::{
        object_store::{ObjectStore, StorageError},
        parameter_store::{ParameterError, ParameterStore},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// API Gateway rejects integration responses above 10 MiB.
pub const MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Name of the environment variable holding the parameter name.
pub const BUCKET_PARAM_ENV: &str = "BUCKET_SSM_PARAM";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("missing required query parameter `filename`")]
    MissingFilename,
    #[error("environment variable `{0}` is not set")]
    MissingConfig(&'static str),
    #[error("could not read feed configuration: {0}")]
    Parameter(#[from] ParameterError),
    #[error("invalid feed configuration: {0}")]
    Location(#[from] LocationError),
    #[error("could not retrieve `{key}`: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("object `{key}` has no entity tag")]
    MissingETag { key: String },
    #[error("object `{key}` is {size} bytes, exceeding the {limit} byte response limit")]
    PayloadTooLarge { key: String, size: u64, limit: u64 },
}

pub type FeedResult<T> = Result<T, FeedError>;

/// What the caller asked for.
#[derive(Clone, Debug, Default)]
pub struct FeedRequest {
    pub filename: Option<String>,
    /// Return the entity tag instead of the content.
    pub md5: bool,
}

/// What the endpoint sends back on success.
#[derive(Debug)]
pub enum FeedResponse {
    /// The object's entity tag, quoted as stored.
    ETag(String),
    /// The full object.
    Object(ObjectBody),
}

#[derive(Clone)]
pub struct FeedService {
    parameters: Arc<dyn ParameterStore>,
    objects: Arc<dyn ObjectStore>,

    /// Name of the parameter holding the `FeedLocation` record.
    bucket_param: Option<String>,

    max_payload_bytes: u64,
}

impl FeedService {
    pub fn new(
        parameters: Arc<dyn ParameterStore>,
        objects: Arc<dyn ObjectStore>,
        bucket_param: Option<String>,
    ) -> Self {
        Self {
            parameters,
            objects,
            bucket_param,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }

    #[cfg(test)]
    pub fn with_max_payload_bytes(mut self, limit: u64) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Read the feed location from the parameter store.
    pub async fn resolve_location(&self) -> FeedResult<FeedLocation> {
        let name = self
            .bucket_param
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(FeedError::MissingConfig(BUCKET_PARAM_ENV))?;

        let raw = self.parameters.get_parameter(name).await?;
        let location = FeedLocation::parse(&raw)?;
        debug!(parameter = name, bucket = %location.bucket_name, "resolved feed location");
        Ok(location)
    }

    /// Serve one request.
    pub async fn fetch(&self, request: &FeedRequest) -> FeedResult<FeedResponse> {
        let key = request
            .filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or(FeedError::MissingFilename)?;

        let location = self.resolve_location().await?;
        let bucket = location.bucket_name.as_str();

        let head = self
            .objects
            .head_object(bucket, key)
            .await
            .map_err(|source| FeedError::Storage {
                key: key.to_string(),
                source,
            })?;

        if request.md5 {
            let e_tag = self
                .objects
                .entity_tag(bucket, key, &head)
                .await
                .map_err(|source| FeedError::Storage {
                    key: key.to_string(),
                    source,
                })?
                .ok_or_else(|| FeedError::MissingETag {
                    key: key.to_string(),
                })?;
            info!(bucket, key, %e_tag, "returning entity tag");
            return Ok(FeedResponse::ETag(e_tag));
        }

        self.ensure_within_limit(key, head.content_length)?;

        let body = self
            .objects
            .get_object(bucket, key)
            .await
            .map_err(|source| FeedError::Storage {
                key: key.to_string(),
                source,
            })?;

        // The object may have been replaced since the head call.
        self.ensure_within_limit(key, body.bytes.len() as u64)?;

        info!(bucket, key, size = body.bytes.len(), "returning object");
        Ok(FeedResponse::Object(body))
    }

    fn ensure_within_limit(&self, key: &str, size: u64) -> FeedResult<()> {
        if size > self.max_payload_bytes {
            return Err(FeedError::PayloadTooLarge {
                key: key.to_string(),
                size,
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory backends shared by service and handler tests.

    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use crate::{
        models::object::ObjectHead,
        services::{object_store::StorageResult, parameter_store::ParameterResult},
    };

    pub const PARAM: &str = "/url-feed/bucket";
    pub const BUCKET: &str = "feed-bucket";

    #[derive(Default)]
    pub struct FakeParameters {
        pub values: HashMap<String, String>,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl ParameterStore for FakeParameters {
        async fn get_parameter(&self, name: &str) -> ParameterResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.values
                .get(name)
                .cloned()
                .ok_or_else(|| ParameterError::NotFound(name.to_string()))
        }
    }

    #[derive(Default)]
    pub struct FakeObjects {
        pub objects: HashMap<(String, String), (ObjectHead, Bytes)>,
        pub head_calls: AtomicUsize,
        pub get_calls: AtomicUsize,
    }

    impl FakeObjects {
        pub fn put(&mut self, key: &str, content_type: &str, bytes: &[u8]) {
            let head = ObjectHead {
                e_tag: Some(format!("\"{:x}\"", md5::compute(bytes))),
                content_length: bytes.len() as u64,
                content_type: Some(content_type.to_string()),
                last_modified: None,
            };
            self.put_head(key, head, Bytes::copy_from_slice(bytes));
        }

        pub fn put_head(&mut self, key: &str, head: ObjectHead, bytes: Bytes) {
            self.objects
                .insert((BUCKET.to_string(), key.to_string()), (head, bytes));
        }

        fn lookup(&self, bucket: &str, key: &str) -> StorageResult<&(ObjectHead, Bytes)> {
            self.objects
                .get(&(bucket.to_string(), key.to_string()))
                .ok_or_else(|| StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }
    }

    #[async_trait]
    impl ObjectStore for FakeObjects {
        async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            self.lookup(bucket, key).map(|(head, _)| head.clone())
        }

        async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectBody> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.lookup(bucket, key).map(|(head, bytes)| ObjectBody {
                head: head.clone(),
                bytes: bytes.clone(),
            })
        }
    }

    pub fn parameters() -> Arc<FakeParameters> {
        let mut params = FakeParameters::default();
        params.values.insert(
            PARAM.to_string(),
            format!(r#"{{"bucket_name": "{BUCKET}", "object_key": "badurls.txt"}}"#),
        );
        Arc::new(params)
    }

    pub fn objects() -> FakeObjects {
        let mut objects = FakeObjects::default();
        objects.put("badurls.txt", "text/plain", b"http://bad.example\nhttp://worse.example\n");
        objects
    }

    pub fn service(objects: Arc<FakeObjects>) -> FeedService {
        FeedService::new(parameters(), objects, Some(PARAM.to_string()))
    }
}
