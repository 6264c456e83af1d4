//! Blob storage client implementation of BaseBlobStore.
//!
//! Talks to a Supabase-style storage REST API: object upload, signed
//! URLs, and an optional public CDN base for buckets exposed publicly.

use async_trait::async_trait;
use media_pipeline::{BaseBlobStore, BlobError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

pub struct StorageClient {
    base_url: String,
    bucket: String,
    service_key: String,
    public_base_url: Option<String>,
    client: reqwest::Client,
}

impl StorageClient {
    pub fn new(
        base_url: String,
        bucket: String,
        service_key: String,
        public_base_url: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket,
            service_key,
            public_base_url: public_base_url.map(|b| b.trim_end_matches('/').to_string()),
            client,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl BaseBlobStore for StorageClient {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.service_key)
            .header("Content-Type", content_type)
            // Retried stage runs re-use timestamp-qualified keys only on
            // collision; allow overwrite rather than erroring.
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| BlobError::new("put", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::new("put", format!("{status}: {body}")));
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_seconds: u64) -> Result<String, BlobError> {
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/sign/{}/{}",
                self.base_url, self.bucket, key
            ))
            .bearer_auth(&self.service_key)
            .json(&SignRequest {
                expires_in: ttl_seconds,
            })
            .send()
            .await
            .map_err(|e| BlobError::new("signed_url", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::new("signed_url", format!("{status}: {body}")));
        }

        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| BlobError::new("signed_url", e.to_string()))?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}/{}", base, self.bucket, key))
    }

    async fn put_from_remote_url(&self, key: &str, source_url: &str) -> Result<i64, BlobError> {
        // Pull the vendor output and store it; the vendor URL is
        // time-limited, our copy is not.
        let bytes = self.fetch(source_url).await?;
        let size = bytes.len() as i64;
        self.put(key, bytes, "video/mp4").await?;
        Ok(size)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlobError::new("fetch", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlobError::new("fetch", format!("{status} from {url}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BlobError::new("fetch", e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
