//! Render-farm capability.

use async_trait::async_trait;

use super::ExternalJobState;
use crate::error::ProviderError;

/// Vendor-reported render status.
#[derive(Debug, Clone)]
pub struct RenderStatus {
    pub state: ExternalJobState,
    /// Fraction complete (0.0..=1.0) when the vendor reports it.
    pub progress: Option<f32>,
    pub output_url: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub duration_frames: Option<i64>,
    pub fps: Option<f64>,
    pub error: Option<String>,
}

#[async_trait]
pub trait BaseRenderService: Send + Sync {
    /// Provider key for request spacing and error attribution.
    fn provider(&self) -> &str;

    /// Whether a render endpoint is configured. When it is not, the render
    /// stage responds with the computed input props instead of failing, so
    /// callers can inspect what would be sent.
    fn is_configured(&self) -> bool;

    /// Submit a composition for rendering. Returns the vendor's job id.
    async fn start_render(
        &self,
        composition_id: &str,
        input_props: &serde_json::Value,
    ) -> Result<String, ProviderError>;

    async fn render_status(&self, external_id: &str) -> Result<RenderStatus, ProviderError>;
}
