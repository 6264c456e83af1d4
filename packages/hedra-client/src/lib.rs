//! Pure Hedra REST API client.
//!
//! A minimal client for the Hedra character-video platform. Supports
//! uploading assets, starting generations, and polling generation status.
//!
//! # Example
//!
//! ```rust,ignore
//! use hedra_client::HedraClient;
//!
//! let client = HedraClient::new("your-api-key".into());
//!
//! let audio = client.create_asset("lesson-audio", "audio").await?;
//! client.upload_asset(&audio.id, bytes, "audio/mpeg").await?;
//! let generation = client.start_generation(&input).await?;
//! let status = client.generation_status(&generation.id).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{HedraError, Result};
pub use types::{
    AssetData, CreateAssetInput, GenerationData, GenerationInput, GenerationStatusData,
};

const BASE_URL: &str = "https://api.hedra.com/web-app/public";

pub struct HedraClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HedraClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (self-hosted proxy, test
    /// server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create an empty asset slot. Returns immediately with asset
    /// metadata; bytes are uploaded separately.
    pub async fn create_asset(&self, name: &str, asset_type: &str) -> Result<AssetData> {
        let input = CreateAssetInput {
            name: name.to_string(),
            asset_type: asset_type.to_string(),
        };

        let url = format!("{}/assets", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HedraError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let asset: AssetData = resp.json().await?;
        tracing::debug!(asset_id = %asset.id, asset_type, "Hedra asset created");
        Ok(asset)
    }

    /// Upload bytes into a created asset slot.
    pub async fn upload_asset(
        &self,
        asset_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = format!("{}/assets/{}/upload", self.base_url, asset_id);
        let resp = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HedraError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(())
    }

    /// Start a character video generation. Returns immediately with the
    /// generation id; completion is observed via
    /// [`Self::generation_status`].
    pub async fn start_generation(&self, input: &GenerationInput) -> Result<GenerationData> {
        let url = format!("{}/generations", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HedraError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let generation: GenerationData = resp.json().await?;
        tracing::info!(generation_id = %generation.id, "Hedra generation started");
        Ok(generation)
    }

    /// One status check for a generation. Never blocks waiting for
    /// completion.
    pub async fn generation_status(&self, generation_id: &str) -> Result<GenerationStatusData> {
        let url = format!("{}/generations/{}/status", self.base_url, generation_id);
        let resp = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HedraError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let generation: GenerationStatusData = resp.json().await?;
        tracing::debug!(
            generation_id = %generation.id,
            status = %generation.status,
            "Hedra generation status"
        );
        Ok(generation)
    }
}
