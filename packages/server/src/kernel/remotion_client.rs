//! Remotion render-server client implementation of BaseRenderService.
//!
//! Talks to a self-hosted Remotion render server. When no endpoint is
//! configured, `is_configured` reports false and the render stage answers
//! with the computed input props instead of submitting.

use async_trait::async_trait;
use media_pipeline::{BaseRenderService, ExternalJobState, ProviderError, RenderStatus};
use serde::{Deserialize, Serialize};

use super::classify_transport;

const PROVIDER: &str = "remotion";

#[derive(Debug, Serialize)]
struct StartRenderRequest<'a> {
    #[serde(rename = "compositionId")]
    composition_id: &'a str,
    #[serde(rename = "inputProps")]
    input_props: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StartRenderResponse {
    #[serde(rename = "renderId")]
    render_id: String,
}

#[derive(Debug, Deserialize)]
struct RenderStatusResponse {
    /// "rendering", "done", or "error".
    status: String,
    progress: Option<f32>,
    #[serde(rename = "outputUrl")]
    output_url: Option<String>,
    #[serde(rename = "fileSizeBytes")]
    file_size_bytes: Option<i64>,
    #[serde(rename = "durationFrames")]
    duration_frames: Option<i64>,
    fps: Option<f64>,
    error: Option<String>,
}

pub struct RemotionClient {
    base_url: Option<String>,
    client: reqwest::Client,
}

impl RemotionClient {
    pub fn new(base_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { base_url, client })
    }

    fn endpoint(&self) -> Result<&str, ProviderError> {
        self.base_url
            .as_deref()
            .ok_or_else(|| ProviderError::permanent(PROVIDER, "render server not configured"))
    }
}

#[async_trait]
impl BaseRenderService for RemotionClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    async fn start_render(
        &self,
        composition_id: &str,
        input_props: &serde_json::Value,
    ) -> Result<String, ProviderError> {
        let base = self.endpoint()?;
        let response = self
            .client
            .post(format!("{base}/renders"))
            .json(&StartRenderRequest {
                composition_id,
                input_props,
            })
            .send()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::http(PROVIDER, status.as_u16(), message));
        }

        let started: StartRenderResponse = response
            .json()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        tracing::info!(render_id = %started.render_id, composition_id, "Remotion render started");
        Ok(started.render_id)
    }

    async fn render_status(&self, external_id: &str) -> Result<RenderStatus, ProviderError> {
        let base = self.endpoint()?;
        let response = self
            .client
            .get(format!("{base}/renders/{external_id}"))
            .send()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::http(PROVIDER, status.as_u16(), message));
        }

        let body: RenderStatusResponse = response
            .json()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        let state = match body.status.as_str() {
            "done" => ExternalJobState::Complete,
            "error" => ExternalJobState::Failed,
            _ => ExternalJobState::InProgress,
        };

        Ok(RenderStatus {
            state,
            progress: body.progress,
            output_url: body.output_url,
            file_size_bytes: body.file_size_bytes,
            duration_frames: body.duration_frames,
            fps: body.fps,
            error: body.error,
        })
    }
}
