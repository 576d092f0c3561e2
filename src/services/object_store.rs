//! src/services/object_store.rs
//!
//! Object store backends. Two read operations only: `head_object` for
//! metadata and `get_object` for the full payload. S3 is the production
//! backend; the local backend serves `base_path/{bucket}/{key}` from disk and
//! derives its entity tags from an MD5 of the content, like S3 does for
//! single-part uploads.

use crate::models::object::{ObjectBody, ObjectHead};
use async_trait::async_trait;
use aws_sdk_s3::{
    error::DisplayErrorContext,
    operation::{get_object::GetObjectError, head_object::HeadObjectError},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::Context;
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("object store request failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read access to a bucket/key blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch only object metadata.
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead>;

    /// Fetch metadata and the complete payload.
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectBody>;

    /// Entity tag for an object whose head was already fetched. Stores that
    /// report the tag with the metadata just hand it back.
    async fn entity_tag(
        &self,
        _bucket: &str,
        _key: &str,
        head: &ObjectHead,
    ) -> StorageResult<Option<String>> {
        Ok(head.e_tag.clone())
    }
}

/// Amazon S3.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

fn smithy_to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

/// S3 always sends Content-Length; without it the size limit cannot be
/// enforced, so treat its absence as a failed request.
fn required_length(length: Option<i64>, bucket: &str, key: &str) -> StorageResult<u64> {
    length
        .and_then(|len| u64::try_from(len).ok())
        .ok_or_else(|| {
            StorageError::Backend(format!(
                "no Content-Length reported for `{key}` in bucket `{bucket}`"
            ))
        })
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        debug!(bucket, key, "HeadObject");
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(HeadObjectError::NotFound(_)) => StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                _ => StorageError::Backend(DisplayErrorContext(&err).to_string()),
            })?;

        Ok(ObjectHead {
            e_tag: resp.e_tag().map(str::to_string),
            content_length: required_length(resp.content_length(), bucket, key)?,
            content_type: resp.content_type().map(str::to_string),
            last_modified: resp.last_modified().and_then(smithy_to_chrono),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectBody> {
        debug!(bucket, key, "GetObject");
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(GetObjectError::NoSuchKey(_)) => StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                _ => StorageError::Backend(DisplayErrorContext(&err).to_string()),
            })?;

        let head = ObjectHead {
            e_tag: resp.e_tag().map(str::to_string),
            content_length: required_length(resp.content_length(), bucket, key)?,
            content_type: resp.content_type().map(str::to_string),
            last_modified: resp.last_modified().and_then(smithy_to_chrono),
        };

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Backend(format!("failed to read object body: {err}")))?
            .into_bytes();

        Ok(ObjectBody { head, bytes })
    }
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const HASH_CHUNK: usize = 64 * 1024;

/// Directory-backed object store for local runs.
///
/// `head_object` only stats the file; the MD5 entity tag is computed when
/// the tag or the body is actually requested.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk; each bucket is a subdirectory.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Rejects keys that are empty, too long, absolute, have `.`/`..`
    /// segments, backslashes or control bytes.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/')
            || !Path::new(key)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// S3-style bucket naming: 3–63 chars of `a-z0-9.-`, starting and ending
    /// with a letter or digit.
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
            return Err(invalid("must be between 3 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }
        if name.contains("..") {
            return Err(invalid("cannot contain consecutive dots"));
        }
        Ok(())
    }

    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        let mut path = self.base_path.clone();
        path.push(bucket);
        path.push(key);
        Ok(path)
    }

    async fn open(&self, bucket: &str, key: &str) -> StorageResult<(PathBuf, File)> {
        let path = self.object_path(bucket, key)?;
        let not_found = || StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                not_found()
            } else {
                StorageError::Io(err)
            }
        })?;
        if !file.metadata().await?.is_file() {
            return Err(not_found());
        }
        Ok((path, file))
    }

    fn head_for(path: &Path, meta: &std::fs::Metadata, e_tag: Option<String>) -> ObjectHead {
        ObjectHead {
            e_tag,
            content_length: meta.len(),
            content_type: Some(content_type_for(path).to_string()),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

fn quoted_hex(digest: md5::Digest) -> String {
    format!("\"{:x}\"", digest)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        let (path, file) = self.open(bucket, key).await?;
        let meta = file.metadata().await?;
        Ok(Self::head_for(&path, &meta, None))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectBody> {
        let (path, mut file) = self.open(bucket, key).await?;
        let meta = file.metadata().await?;
        let mut buf = Vec::with_capacity(meta.len() as usize);
        file.read_to_end(&mut buf).await?;

        let bytes = Bytes::from(buf);
        let head = Self::head_for(&path, &meta, Some(quoted_hex(md5::compute(&bytes))));
        Ok(ObjectBody { head, bytes })
    }

    async fn entity_tag(
        &self,
        bucket: &str,
        key: &str,
        _head: &ObjectHead,
    ) -> StorageResult<Option<String>> {
        let (_, mut file) = self.open(bucket, key).await?;

        let mut digest = Context::new();
        let mut buf = vec![0u8; HASH_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digest.consume(&buf[..n]);
        }
        Ok(Some(quoted_hex(digest.compute())))
    }
}

/// Guess a MIME type from the file extension.
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("xml") => "application/xml",
        Some("gz") => "application/gzip",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        feed_service::{FeedError, FeedRequest, FeedService, MAX_PAYLOAD_BYTES},
        parameter_store::LocalParameterStore,
    };
    use std::sync::Arc;

    fn seeded() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("feed-bucket/lists")).unwrap();
        std::fs::write(dir.path().join("feed-bucket/badurls.txt"), b"http://bad.example\n").unwrap();
        std::fs::write(dir.path().join("feed-bucket/lists/data.bin"), [0u8, 1, 2, 255]).unwrap();
        std::fs::write(dir.path().join("feed-bucket/v1..2.txt"), b"v").unwrap();
        let store = LocalObjectStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn head_reports_metadata_and_tag_is_hashed_on_demand() {
        let (_dir, store) = seeded();
        let head = store.head_object("feed-bucket", "badurls.txt").await.unwrap();
        assert_eq!(head.e_tag, None);
        assert_eq!(head.content_length, 19);
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
        assert!(head.last_modified.is_some());

        let expected = format!("\"{:x}\"", md5::compute(b"http://bad.example\n"));
        let tag = store
            .entity_tag("feed-bucket", "badurls.txt", &head)
            .await
            .unwrap();
        assert_eq!(tag.as_deref(), Some(expected.as_str()));

        let body = store.get_object("feed-bucket", "badurls.txt").await.unwrap();
        assert_eq!(body.head.e_tag, tag);
    }

    #[tokio::test]
    async fn get_returns_exact_bytes_for_nested_keys() {
        let (_dir, store) = seeded();
        let body = store.get_object("feed-bucket", "lists/data.bin").await.unwrap();
        assert_eq!(&body.bytes[..], &[0u8, 1, 2, 255]);
        assert_eq!(body.head.content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(body.head.content_length, 4);
    }

    #[tokio::test]
    async fn oversized_sparse_file_is_refused_from_metadata() {
        let (dir, store) = seeded();
        let huge = std::fs::File::create(dir.path().join("feed-bucket/huge.bin")).unwrap();
        huge.set_len(3 << 30).unwrap();

        let params_dir = dir.path().join(".parameters");
        std::fs::create_dir_all(&params_dir).unwrap();
        std::fs::write(params_dir.join("feed"), r#"{"bucket_name":"feed-bucket"}"#).unwrap();

        let service = FeedService::new(
            Arc::new(LocalParameterStore::new(params_dir)),
            Arc::new(store),
            Some("feed".into()),
        );
        let started = std::time::Instant::now();
        let err = service
            .fetch(&FeedRequest {
                filename: Some("huge.bin".into()),
                md5: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FeedError::PayloadTooLarge { size, limit, .. }
                if size == 3 << 30 && limit == MAX_PAYLOAD_BYTES
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_object_and_directories_are_not_found() {
        let (_dir, store) = seeded();
        assert!(matches!(
            store.head_object("feed-bucket", "nope.txt").await,
            Err(StorageError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            store.get_object("feed-bucket", "lists").await,
            Err(StorageError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn dots_inside_a_segment_are_allowed() {
        let (_dir, store) = seeded();
        let head = store.head_object("feed-bucket", "v1..2.txt").await.unwrap();
        assert_eq!(head.content_length, 1);
    }

    #[tokio::test]
    async fn unsafe_names_are_rejected() {
        let (_dir, store) = seeded();
        for key in ["", "/etc/passwd", "../x", "lists/../../x", "./badurls.txt", "a\\b", "a\nb"] {
            assert!(matches!(
                store.head_object("feed-bucket", key).await,
                Err(StorageError::InvalidObjectKey)
            ));
        }
        for bucket in ["ab", "Feed", "-feed", "feed..b", "feed/x"] {
            assert!(matches!(
                store.head_object(bucket, "badurls.txt").await,
                Err(StorageError::InvalidBucketName { .. })
            ));
        }
    }

    mod s3 {
        use super::super::*;
        use aws_sdk_s3::{
            error::ErrorMetadata,
            operation::{get_object::GetObjectOutput, head_object::HeadObjectOutput},
            primitives::ByteStream,
            types::error::{NoSuchKey, NotFound},
        };
        use aws_smithy_mocks::{mock, mock_client};

        #[tokio::test]
        async fn head_maps_metadata() {
            let rule = mock!(aws_sdk_s3::Client::head_object).then_output(|| {
                HeadObjectOutput::builder()
                    .e_tag("\"0123abcd\"")
                    .content_length(42)
                    .content_type("text/csv")
                    .build()
            });
            let store = S3ObjectStore::new(mock_client!(aws_sdk_s3, [&rule]));

            let head = store.head_object("feed-bucket", "list.csv").await.unwrap();
            assert_eq!(head.e_tag.as_deref(), Some("\"0123abcd\""));
            assert_eq!(head.content_length, 42);
            assert_eq!(head.content_type.as_deref(), Some("text/csv"));
            assert_eq!(
                store.entity_tag("feed-bucket", "list.csv", &head).await.unwrap(),
                head.e_tag
            );
        }

        #[tokio::test]
        async fn head_without_length_is_an_error() {
            let rule = mock!(aws_sdk_s3::Client::head_object)
                .then_output(|| HeadObjectOutput::builder().e_tag("\"x\"").build());
            let store = S3ObjectStore::new(mock_client!(aws_sdk_s3, [&rule]));

            assert!(matches!(
                store.head_object("feed-bucket", "list.csv").await,
                Err(StorageError::Backend(msg)) if msg.contains("Content-Length")
            ));
        }

        #[tokio::test]
        async fn head_not_found_maps_to_object_not_found() {
            let rule = mock!(aws_sdk_s3::Client::head_object)
                .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
            let store = S3ObjectStore::new(mock_client!(aws_sdk_s3, [&rule]));

            assert!(matches!(
                store.head_object("feed-bucket", "gone.txt").await,
                Err(StorageError::ObjectNotFound { bucket, key })
                    if bucket == "feed-bucket" && key == "gone.txt"
            ));
        }

        #[tokio::test]
        async fn access_denied_is_a_backend_error() {
            let rule = mock!(aws_sdk_s3::Client::head_object).then_error(|| {
                HeadObjectError::generic(
                    ErrorMetadata::builder()
                        .code("AccessDenied")
                        .message("Access Denied")
                        .build(),
                )
            });
            let store = S3ObjectStore::new(mock_client!(aws_sdk_s3, [&rule]));

            assert!(matches!(
                store.head_object("feed-bucket", "secret.txt").await,
                Err(StorageError::Backend(_))
            ));
        }

        #[tokio::test]
        async fn get_maps_no_such_key() {
            let rule = mock!(aws_sdk_s3::Client::get_object)
                .then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
            let store = S3ObjectStore::new(mock_client!(aws_sdk_s3, [&rule]));

            assert!(matches!(
                store.get_object("feed-bucket", "gone.txt").await,
                Err(StorageError::ObjectNotFound { .. })
            ));
        }

        #[tokio::test]
        async fn get_collects_body() {
            let rule = mock!(aws_sdk_s3::Client::get_object)
                .match_requests(|req| req.key() == Some("badurls.txt"))
                .then_output(|| {
                    GetObjectOutput::builder()
                        .e_tag("\"tag\"")
                        .content_length(4)
                        .content_type("text/plain")
                        .body(ByteStream::from_static(b"url\n"))
                        .build()
                });
            let store = S3ObjectStore::new(mock_client!(aws_sdk_s3, [&rule]));

            let body = store.get_object("feed-bucket", "badurls.txt").await.unwrap();
            assert_eq!(&body.bytes[..], b"url\n");
            assert_eq!(body.head.e_tag.as_deref(), Some("\"tag\""));
            assert_eq!(body.head.content_type.as_deref(), Some("text/plain"));
        }
    }
}
