//! Adapter bridging the hedra-client crate to the pipeline's
//! BaseAvatarGenerator capability.

use async_trait::async_trait;
use hedra_client::{GenerationInput, HedraClient, HedraError};
use media_pipeline::{
    AssetKind, AvatarGenerationRequest, AvatarGenerationStatus, BaseAvatarGenerator,
    ExternalJobState, ProviderError,
};

const PROVIDER: &str = "hedra";

pub struct HedraAdapter {
    client: HedraClient,
}

impl HedraAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: HedraClient::new(api_key),
        }
    }

    pub fn from_client(client: HedraClient) -> Self {
        Self { client }
    }
}

/// Classify a Hedra client error: 429/502/503/504 and transport drops are
/// transient, everything else is permanent.
fn classify(err: HedraError) -> ProviderError {
    match err.status() {
        Some(status) => ProviderError::http(PROVIDER, status, err.to_string()),
        None => match &err {
            HedraError::Request(inner) if inner.is_timeout() || inner.is_connect() => {
                ProviderError::transient(PROVIDER, err.to_string())
            }
            _ => ProviderError::permanent(PROVIDER, err.to_string()),
        },
    }
}

#[async_trait]
impl BaseAvatarGenerator for HedraAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn create_asset(&self, name: &str, kind: AssetKind) -> Result<String, ProviderError> {
        let asset = self
            .client
            .create_asset(name, kind.as_str())
            .await
            .map_err(classify)?;
        Ok(asset.id)
    }

    async fn upload_asset(
        &self,
        asset_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .upload_asset(asset_id, bytes, content_type)
            .await
            .map_err(classify)
    }

    async fn start_generation(
        &self,
        req: &AvatarGenerationRequest,
    ) -> Result<String, ProviderError> {
        let input = GenerationInput {
            generation_type: "video".to_string(),
            audio_id: req.audio_asset_id.clone(),
            start_keyframe_id: req.character_asset_id.clone(),
            resolution: req.resolution.clone(),
            aspect_ratio: req.aspect_ratio.clone(),
            text_prompt: req.text_prompt.clone(),
        };
        let generation = self
            .client
            .start_generation(&input)
            .await
            .map_err(classify)?;
        Ok(generation.id)
    }

    async fn generation_status(
        &self,
        external_id: &str,
    ) -> Result<AvatarGenerationStatus, ProviderError> {
        let status = self
            .client
            .generation_status(external_id)
            .await
            .map_err(classify)?;

        let state = match status.status.as_str() {
            "complete" => ExternalJobState::Complete,
            "error" => ExternalJobState::Failed,
            // "queued", "processing", and anything unrecognized keep the
            // job in flight.
            _ => ExternalJobState::InProgress,
        };

        Ok(AvatarGenerationStatus {
            state,
            progress: status.progress,
            output_url: status.url,
            error: status.error_message,
        })
    }
}
