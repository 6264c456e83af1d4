//! Blob-store capability.
//!
//! An opaque put/get/signed-URL store for stage artifacts. Keys are
//! timestamp-qualified by the callers so superseded artifacts are never
//! silently overwritten.

use async_trait::async_trait;

use crate::error::BlobError;

#[async_trait]
pub trait BaseBlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;

    /// Mint a time-limited signed URL for a stored object.
    async fn signed_url(&self, key: &str, ttl_seconds: u64) -> Result<String, BlobError>;

    /// Publicly cached URL for a stored object, when the bucket exposes
    /// one. Preferred over a signed URL where both work: no minting
    /// latency and no validity window to outlive.
    fn public_url(&self, key: &str) -> Option<String>;

    /// Server-side fetch-and-store: pull `source_url` directly into the
    /// store without routing the bytes through the application process.
    /// Returns the stored size in bytes.
    async fn put_from_remote_url(&self, key: &str, source_url: &str) -> Result<i64, BlobError>;

    /// Download bytes from a URL (a signed URL of this store, or an
    /// external asset URL supplied by a client).
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError>;
}
