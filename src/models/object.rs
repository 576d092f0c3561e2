//! Represents a feed object as returned by the object store.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Metadata for a stored object, fetched before any body bytes are read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    /// Entity tag exactly as the store reports it, surrounding quotes included.
    pub e_tag: Option<String>,

    /// Size in bytes.
    pub content_length: u64,

    /// Content type (MIME type) recorded at upload time.
    pub content_type: Option<String>,

    /// Timestamp when the object was last modified.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A fully read object.
#[derive(Clone, Debug)]
pub struct ObjectBody {
    pub head: ObjectHead,
    pub bytes: Bytes,
}
