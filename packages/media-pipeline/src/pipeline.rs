//! The pipeline container: injected capabilities plus shared retry and
//! spacing state.
//!
//! Stage entry points live in [`crate::stages`] and [`crate::poller`] as
//! `impl MediaPipeline` blocks; this module owns the container itself and
//! the cross-stage helpers.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{truncate_error, PipelineError, ProviderError, Result};
use crate::retry::RetryConfig;
use crate::spacing::RequestSpacer;
use crate::traits::{
    BaseAvatarGenerator, BaseBlobStore, BaseRenderService, ExternalJobState, VideoJobStore,
};
use crate::types::job::{ArtifactRecord, JobPatch, StageKind, VideoJob, VideoStatus};

/// Minimum inter-call intervals per provider class.
#[derive(Debug, Clone, Copy)]
pub struct SpacingConfig {
    pub tts: Duration,
    pub avatar: Duration,
    pub render: Duration,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            tts: Duration::from_millis(500),
            avatar: Duration::from_millis(1_000),
            render: Duration::from_millis(1_000),
        }
    }
}

/// Operator-configured presentation inputs for the render composition.
#[derive(Debug, Clone)]
pub struct RenderProfile {
    pub brand_primary: String,
    pub brand_secondary: String,
}

impl Default for RenderProfile {
    fn default() -> Self {
        Self {
            brand_primary: "#2563EB".to_string(),
            brand_secondary: "#F59E0B".to_string(),
        }
    }
}

/// Tunables for the pipeline. Defaults match production settings.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub retry: RetryConfig,
    pub spacing: SpacingConfig,
    pub render: RenderProfile,
    pub signed_url_ttl_seconds: u64,
}

impl PipelineConfig {
    pub(crate) fn signed_url_ttl(&self) -> u64 {
        if self.signed_url_ttl_seconds == 0 {
            86_400
        } else {
            self.signed_url_ttl_seconds
        }
    }
}

/// Outcome of a start request for an asynchronous stage (avatar, render).
#[derive(Debug, Clone)]
pub enum StageStart {
    /// External work started now.
    Started { external_id: String },
    /// A duplicate start while the stage is mid-flight: no-op returning
    /// the live external job reference.
    AlreadyRunning { external_id: String },
    /// A duplicate start after the stage completed: no-op returning the
    /// existing artifact.
    AlreadyComplete { artifact: ArtifactRecord },
}

/// Outcome of a render start; carries the composition that was (or would
/// be) submitted.
#[derive(Debug, Clone)]
pub enum RenderStart {
    Started {
        external_id: String,
        composition_id: &'static str,
    },
    AlreadyRunning {
        external_id: String,
        composition_id: &'static str,
    },
    AlreadyComplete {
        artifact: ArtifactRecord,
    },
    /// The render service endpoint is unset; the computed input props are
    /// returned so callers can inspect what would be sent.
    NotConfigured {
        composition_id: &'static str,
        input_props: serde_json::Value,
    },
}

/// Result of one poller invocation.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub state: ExternalJobState,
    pub progress: Option<f32>,
    pub artifact: Option<ArtifactRecord>,
    /// Vendor's own temporary URL, surfaced when generation succeeded but
    /// the hand-off could not persist the output.
    pub fallback_url: Option<String>,
    pub warning: Option<String>,
    pub error_message: Option<String>,
}

impl PollOutcome {
    pub fn in_progress(progress: Option<f32>) -> Self {
        Self {
            state: ExternalJobState::InProgress,
            progress,
            artifact: None,
            fallback_url: None,
            warning: None,
            error_message: None,
        }
    }

    pub fn complete(artifact: ArtifactRecord) -> Self {
        Self {
            state: ExternalJobState::Complete,
            progress: Some(1.0),
            artifact: Some(artifact),
            fallback_url: None,
            warning: None,
            error_message: None,
        }
    }

    /// Generation succeeded but persisting the output failed; the vendor's
    /// temporary URL is all we can offer.
    pub fn degraded(fallback_url: String, warning: String) -> Self {
        Self {
            state: ExternalJobState::Complete,
            progress: Some(1.0),
            artifact: None,
            fallback_url: Some(fallback_url),
            warning: Some(warning),
            error_message: None,
        }
    }

    pub fn failed(error_message: String) -> Self {
        Self {
            state: ExternalJobState::Failed,
            progress: None,
            artifact: None,
            fallback_url: None,
            warning: None,
            error_message: Some(error_message),
        }
    }
}

/// The media pipeline: stage drivers, poller, and their shared
/// dependencies. The speech synthesizer is injected per call because the
/// voice provider is a per-request choice.
pub struct MediaPipeline {
    pub(crate) jobs: Arc<dyn VideoJobStore>,
    pub(crate) blobs: Arc<dyn BaseBlobStore>,
    pub(crate) avatar: Arc<dyn BaseAvatarGenerator>,
    pub(crate) render: Arc<dyn BaseRenderService>,
    pub(crate) spacer: Arc<RequestSpacer>,
    pub(crate) config: PipelineConfig,
}

impl MediaPipeline {
    pub fn new(
        jobs: Arc<dyn VideoJobStore>,
        blobs: Arc<dyn BaseBlobStore>,
        avatar: Arc<dyn BaseAvatarGenerator>,
        render: Arc<dyn BaseRenderService>,
        spacer: Arc<RequestSpacer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            jobs,
            blobs,
            avatar,
            render,
            spacer,
            config,
        }
    }

    /// The underlying job store, for read paths that need no stage logic.
    pub fn jobs(&self) -> &Arc<dyn VideoJobStore> {
        &self.jobs
    }

    /// Mark a job cancelled. In-flight external work is not aborted at the
    /// vendor; the status transition stops every stage driver and poller.
    /// No-op on a job that already reached a terminal state.
    pub async fn cancel(&self, job_id: Uuid) -> Result<VideoJob> {
        let job = self.jobs.get(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        tracing::info!(job_id = %job_id, from = job.status.as_str(), "Cancelling job");
        self.jobs
            .patch(job_id, JobPatch::status(VideoStatus::Cancelled))
            .await
    }

    /// Load a job and refuse to act on a cancelled one. Every stage and
    /// poller entry point goes through this.
    pub(crate) async fn load_actionable(&self, job_id: Uuid) -> Result<VideoJob> {
        let job = self.jobs.get(job_id).await?;
        if job.status == VideoStatus::Cancelled {
            return Err(PipelineError::Cancelled { job_id });
        }
        Ok(job)
    }

    /// Record a stage failure on the job and hand the original error back.
    /// Only stage drivers and the poller call this; lower-level components
    /// never write `failed`.
    pub(crate) async fn fail_stage(
        &self,
        job_id: Uuid,
        stage: StageKind,
        err: PipelineError,
    ) -> PipelineError {
        let message = truncate_error(&err.to_string());
        tracing::error!(job_id = %job_id, stage = %stage, error = %message, "Stage failed");
        if let Err(patch_err) = self
            .jobs
            .patch(job_id, JobPatch::failed(stage, message))
            .await
        {
            tracing::error!(job_id = %job_id, error = %patch_err, "Could not record stage failure");
        }
        err
    }

    /// Durable URL for a stored artifact: the public URL when the bucket
    /// exposes one, a long-lived signed URL otherwise.
    pub(crate) async fn artifact_url(&self, key: &str) -> std::result::Result<String, crate::error::BlobError> {
        if let Some(url) = self.blobs.public_url(key) {
            return Ok(url);
        }
        self.blobs.signed_url(key, self.config.signed_url_ttl()).await
    }

    /// Structured-logging retry hook shared by every vendor call.
    pub(crate) fn log_retry(
        job_id: Uuid,
        provider: String,
        what: &'static str,
    ) -> impl Fn(u32, Duration, &ProviderError) + Send + Sync {
        move |attempt, delay, err| {
            tracing::warn!(
                job_id = %job_id,
                provider = %provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying {what}"
            );
        }
    }
}
