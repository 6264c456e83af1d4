//! Avatar-generation capability.
//!
//! The vendor cannot fetch from arbitrary URLs, so inputs are uploaded as
//! vendor assets first (create + upload), then a generation job is started
//! and observed via polling.

use async_trait::async_trait;

use super::ExternalJobState;
use crate::error::ProviderError;

/// Kind of asset uploaded to the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Audio,
    Image,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Audio => "audio",
            AssetKind::Image => "image",
        }
    }
}

/// Inputs for starting a generation once all assets exist vendor-side.
#[derive(Debug, Clone)]
pub struct AvatarGenerationRequest {
    pub audio_asset_id: String,
    /// Uploaded character image asset, or a vendor-side character
    /// reference id supplied by the client.
    pub character_asset_id: String,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub text_prompt: Option<String>,
}

/// Vendor-reported generation status.
#[derive(Debug, Clone)]
pub struct AvatarGenerationStatus {
    pub state: ExternalJobState,
    pub progress: Option<f32>,
    /// Time-limited download URL, present on completion.
    pub output_url: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait BaseAvatarGenerator: Send + Sync {
    /// Provider key for request spacing and error attribution.
    fn provider(&self) -> &str;

    async fn create_asset(&self, name: &str, kind: AssetKind) -> Result<String, ProviderError>;

    async fn upload_asset(
        &self,
        asset_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ProviderError>;

    /// Start an asynchronous generation. Returns the vendor's job id;
    /// completion is observed only via [`Self::generation_status`].
    async fn start_generation(
        &self,
        req: &AvatarGenerationRequest,
    ) -> Result<String, ProviderError>;

    async fn generation_status(
        &self,
        external_id: &str,
    ) -> Result<AvatarGenerationStatus, ProviderError>;
}
