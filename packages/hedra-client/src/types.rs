use serde::{Deserialize, Serialize};

/// Request body for creating an asset slot.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAssetInput {
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
}

/// Created asset metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetData {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
}

/// Request body for starting a character video generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationInput {
    #[serde(rename = "type")]
    pub generation_type: String,
    #[serde(rename = "audioId")]
    pub audio_id: String,
    #[serde(rename = "startKeyframeId")]
    pub start_keyframe_id: String,
    #[serde(rename = "resolution", skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(rename = "aspectRatio", skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(rename = "textPrompt", skip_serializing_if = "Option::is_none")]
    pub text_prompt: Option<String>,
}

/// Generation job metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationData {
    pub id: String,
    pub status: Option<String>,
}

/// Polled generation status.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationStatusData {
    pub id: String,
    /// "queued", "processing", "complete", or "error".
    pub status: String,
    pub progress: Option<f32>,
    /// Time-limited download URL, present once complete.
    pub url: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}
