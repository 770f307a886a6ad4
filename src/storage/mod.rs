//! Object storage sink for media artifacts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::extractors::MediaStream;

pub mod s3;

pub use s3::S3Store;

/// URI scheme used for stored objects
pub const STORAGE_SCHEME: &str = "s3";

/// Location of a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    pub bucket: String,
    pub key: String,
    /// `scheme://bucket/key`
    pub uri: String,
}

impl StorageObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let key = key.into();
        let uri = format!("{}://{}/{}", STORAGE_SCHEME, bucket, key);
        Self { bucket, key, uri }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Source stream failed: {0}")]
    Source(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Invalid storage URI: {0}")]
    InvalidUri(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Write/read access to a single bucket of an object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket all keys of this store live in
    fn bucket(&self) -> &str;

    /// Drain `stream` into an object at `key`.
    ///
    /// Resolves once the object is durable. When the stream yields an error, the sink fails, or
    /// `cancel` fires first, nothing is left under `key`.
    async fn put_stream(
        &self,
        key: &str,
        content_type: &str,
        stream: MediaStream,
        cancel: &CancellationToken,
    ) -> StorageResult<StorageObject>;

    /// Stream an object of any readable bucket into a local file, returning its size
    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<u64>;

    /// Remove an object
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Descriptor for `key` in this store's bucket
    fn object(&self, key: &str) -> StorageObject {
        StorageObject::new(self.bucket(), key)
    }
}

/// Split `scheme://bucket/key` into bucket and key.
///
/// The key keeps any further `/` separators; percent-escapes are decoded.
pub fn parse_uri(uri: &str) -> StorageResult<(String, String)> {
    let (scheme, rest) = uri
        .trim()
        .split_once("://")
        .ok_or_else(|| StorageError::InvalidUri(format!("missing scheme in {}", uri)))?;

    if scheme.is_empty() {
        return Err(StorageError::InvalidUri(format!("missing scheme in {}", uri)));
    }

    let (bucket, key) = rest
        .split_once('/')
        .ok_or_else(|| StorageError::InvalidUri(format!("missing object key in {}", uri)))?;

    if bucket.is_empty() {
        return Err(StorageError::InvalidUri(format!("missing bucket in {}", uri)));
    }
    if key.is_empty() {
        return Err(StorageError::InvalidUri(format!("missing object key in {}", uri)));
    }

    let key = urlencoding::decode(key)
        .map_err(|e| StorageError::InvalidUri(format!("{}: {}", uri, e)))?
        .into_owned();

    Ok((bucket.to_string(), key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_uri_composition() {
        let object = StorageObject::new("media", "media-ingest/My Clip_1700000000000_AV.mp4");
        assert_eq!(object.uri, "s3://media/media-ingest/My Clip_1700000000000_AV.mp4");
    }

    #[test]
    fn test_parse_uri_round_trips_descriptor() {
        let object = StorageObject::new("media", "prefix/nested/My Clip_1_A.mp3");
        let (bucket, key) = parse_uri(&object.uri).unwrap();
        assert_eq!(bucket, object.bucket);
        assert_eq!(key, object.key);
    }

    #[test]
    fn test_parse_uri_decodes_escapes() {
        let (bucket, key) = parse_uri("gs://bucket/My%20Clip_1_A.mp3").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "My Clip_1_A.mp3");
    }

    #[test]
    fn test_parse_uri_rejects_malformed() {
        for uri in ["", "bucket/key", "://bucket/key", "s3://bucket", "s3://bucket/", "s3:///key"] {
            assert!(
                matches!(parse_uri(uri), Err(StorageError::InvalidUri(_))),
                "expected {:?} to be rejected",
                uri
            );
        }
    }
}
