//! Speech-synthesis capability.

use async_trait::async_trait;

use crate::error::ProviderError;

/// One synthesis request: a lesson script and a voice selection.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub script: String,
    pub voice_id: String,
    pub speed: Option<f32>,
    pub language: Option<String>,
}

/// Synthesized audio payload.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Vendor-reported duration, when the vendor reports one. Otherwise
    /// the audio stage estimates from payload size.
    pub duration_seconds: Option<f64>,
}

#[async_trait]
pub trait BaseSpeechSynthesizer: Send + Sync {
    /// Provider key for request spacing and error attribution.
    fn provider(&self) -> &str;

    /// Synthesize speech for a script. Errors must be classified by the
    /// adapter: rate-limit/unavailable retryable, all else permanent.
    async fn synthesize(&self, req: &SpeechRequest) -> Result<SynthesizedAudio, ProviderError>;
}
