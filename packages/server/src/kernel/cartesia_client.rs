//! Cartesia TTS client implementation of BaseSpeechSynthesizer.

use async_trait::async_trait;
use media_pipeline::{BaseSpeechSynthesizer, ProviderError, SpeechRequest, SynthesizedAudio};
use serde::Serialize;

use super::classify_transport;

const PROVIDER: &str = "cartesia";
const BASE_URL: &str = "https://api.cartesia.ai";
const API_VERSION: &str = "2024-11-13";

/// Cartesia API request for byte synthesis
#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: VoiceSpec<'a>,
    output_format: OutputFormat<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

#[derive(Debug, Serialize)]
struct VoiceSpec<'a> {
    mode: &'a str,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct OutputFormat<'a> {
    container: &'a str,
    bit_rate: u32,
    sample_rate: u32,
}

pub struct CartesiaClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl CartesiaClient {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl BaseSpeechSynthesizer for CartesiaClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn synthesize(&self, req: &SpeechRequest) -> Result<SynthesizedAudio, ProviderError> {
        let body = SynthesizeRequest {
            model_id: "sonic-2",
            transcript: &req.script,
            voice: VoiceSpec {
                mode: "id",
                id: &req.voice_id,
            },
            // 128 kbps MP3; the audio stage's duration estimate assumes it.
            output_format: OutputFormat {
                container: "mp3",
                bit_rate: 128_000,
                sample_rate: 44_100,
            },
            language: req.language.as_deref(),
            speed: req.speed,
        };

        let response = self
            .client
            .post(format!("{}/tts/bytes", self.base_url))
            .header("X-API-Key", &self.api_key)
            .header("Cartesia-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::http(PROVIDER, status.as_u16(), message));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        tracing::info!(
            voice_id = %req.voice_id,
            size_bytes = bytes.len(),
            "Cartesia synthesis complete"
        );

        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            content_type: "audio/mpeg".to_string(),
            // Cartesia's bytes endpoint reports no duration.
            duration_seconds: None,
        })
    }
}
