//! ElevenLabs TTS client implementation of BaseSpeechSynthesizer.

use async_trait::async_trait;
use media_pipeline::{BaseSpeechSynthesizer, ProviderError, SpeechRequest, SynthesizedAudio};
use serde::Serialize;

use super::classify_transport;

const PROVIDER: &str = "elevenlabs";
const BASE_URL: &str = "https://api.elevenlabs.io";

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<VoiceSettings>,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    speed: f32,
}

pub struct ElevenLabsClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl ElevenLabsClient {
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
impl BaseSpeechSynthesizer for ElevenLabsClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn synthesize(&self, req: &SpeechRequest) -> Result<SynthesizedAudio, ProviderError> {
        let body = SynthesizeRequest {
            text: &req.script,
            model_id: "eleven_multilingual_v2",
            language_code: req.language.as_deref(),
            voice_settings: req.speed.map(|speed| VoiceSettings { speed }),
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}?output_format=mp3_44100_128",
                self.base_url, req.voice_id
            ))
            .header("xi-api-key", &self.api_key)
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
            "ElevenLabs synthesis complete"
        );

        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            content_type: "audio/mpeg".to_string(),
            duration_seconds: None,
        })
    }
}
