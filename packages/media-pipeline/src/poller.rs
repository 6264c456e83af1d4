//! External job poller.
//!
//! For providers that run work asynchronously (avatar generation,
//! rendering), each invocation performs exactly one status check and, only
//! on a terminal state, the artifact hand-off: download into the blob
//! store, write the artifact, clear the external reference, advance
//! status. The hand-off is idempotent — a poll after it already completed
//! returns the cached artifact without touching the vendor or the store.
//!
//! A transient error on the status check itself surfaces to the caller
//! (who polls again); it never fails the job.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{truncate_error, PipelineError, Result};
use crate::pipeline::{MediaPipeline, PollOutcome};
use crate::traits::{
    BaseAvatarGenerator, BaseBlobStore, BaseRenderService, ExternalJobState, RenderStatus,
    VideoJobStore,
};
use crate::types::job::{ArtifactRecord, JobPatch, StageKind, VideoJob, VideoStatus};

impl MediaPipeline {
    /// One avatar-generation status check.
    pub async fn poll_avatar(&self, job_id: Uuid) -> Result<PollOutcome> {
        let job = self.load_actionable(job_id).await?;

        // Hand-off already done.
        if let Some(artifact) = &job.avatar_output {
            if job.external_job.is_none() {
                return Ok(PollOutcome::complete(artifact.clone()));
            }
        }
        if job.status == VideoStatus::Failed {
            return Ok(PollOutcome::failed(
                job.error_message.clone().unwrap_or_default(),
            ));
        }

        let external = job.external_job.clone().ok_or(PipelineError::Precondition {
            stage: StageKind::AvatarGeneration,
            missing: "active external job",
        })?;

        let provider = self.avatar.provider().to_string();
        self.spacer
            .space(&provider, self.config.spacing.avatar)
            .await;
        let status = self.avatar.generation_status(&external.external_id).await?;

        match status.state {
            ExternalJobState::InProgress => Ok(PollOutcome::in_progress(status.progress)),
            ExternalJobState::Failed => {
                let message = truncate_error(
                    status
                        .error
                        .as_deref()
                        .unwrap_or("avatar generation failed"),
                );
                self.jobs
                    .patch(
                        job_id,
                        JobPatch::failed(StageKind::AvatarGeneration, message.clone()),
                    )
                    .await?;
                tracing::error!(job_id = %job_id, error = %message, "Avatar generation failed at vendor");
                Ok(PollOutcome::failed(message))
            }
            ExternalJobState::Complete => {
                let Some(output_url) = status.output_url else {
                    let message = "vendor reported completion without an output URL".to_string();
                    self.jobs
                        .patch(
                            job_id,
                            JobPatch::failed(StageKind::AvatarGeneration, message.clone()),
                        )
                        .await?;
                    return Ok(PollOutcome::failed(message));
                };
                let duration = job
                    .audio_output
                    .as_ref()
                    .map(|a| a.duration_seconds)
                    .unwrap_or(0.0);
                self.hand_off(
                    job_id,
                    &output_url,
                    format!("videos/{}/avatar/{}.mp4", job_id, Utc::now().timestamp_millis()),
                    duration,
                    |artifact| JobPatch {
                        avatar_output: Some(artifact),
                        external_job: Some(None),
                        ..Default::default()
                    },
                )
                .await
            }
        }
    }

    /// One render status check. `external_id` comes from the client's poll
    /// URL and must match the job's live reference (or the job must
    /// already be past the stage).
    pub async fn poll_render(&self, job_id: Uuid, external_id: &str) -> Result<PollOutcome> {
        let job = self.load_actionable(job_id).await?;

        if let Some(artifact) = &job.final_output {
            return Ok(PollOutcome::complete(artifact.clone()));
        }
        if job.status == VideoStatus::Failed {
            return Ok(PollOutcome::failed(
                job.error_message.clone().unwrap_or_default(),
            ));
        }

        let external = job.external_job.clone().ok_or(PipelineError::Precondition {
            stage: StageKind::Rendering,
            missing: "active external job",
        })?;
        if external.external_id != external_id {
            return Err(PipelineError::Precondition {
                stage: StageKind::Rendering,
                missing: "matching external job id",
            });
        }

        let provider = self.render.provider().to_string();
        self.spacer
            .space(&provider, self.config.spacing.render)
            .await;
        let status = self.render.render_status(&external.external_id).await?;

        match status.state {
            ExternalJobState::InProgress => Ok(PollOutcome::in_progress(status.progress)),
            ExternalJobState::Failed => {
                let message =
                    truncate_error(status.error.as_deref().unwrap_or("render failed"));
                self.jobs
                    .patch(job_id, JobPatch::failed(StageKind::Rendering, message.clone()))
                    .await?;
                tracing::error!(job_id = %job_id, error = %message, "Render failed at vendor");
                Ok(PollOutcome::failed(message))
            }
            ExternalJobState::Complete => {
                let Some(output_url) = status.output_url.clone() else {
                    let message = "vendor reported completion without an output URL".to_string();
                    self.jobs
                        .patch(job_id, JobPatch::failed(StageKind::Rendering, message.clone()))
                        .await?;
                    return Ok(PollOutcome::failed(message));
                };
                let duration = render_duration_seconds(&status, &job);
                self.hand_off(
                    job_id,
                    &output_url,
                    format!("videos/{}/final/{}.mp4", job_id, Utc::now().timestamp_millis()),
                    duration,
                    |artifact| JobPatch {
                        status: Some(VideoStatus::Completed),
                        final_output: Some(artifact),
                        external_job: Some(None),
                        ..Default::default()
                    },
                )
                .await
            }
        }
    }

    /// Pull a finished external asset into the blob store and patch the
    /// job. If persisting fails, the vendor's output is not lost: its
    /// temporary URL is surfaced with a warning and the external reference
    /// stays live so a later poll can retry the hand-off.
    async fn hand_off(
        &self,
        job_id: Uuid,
        output_url: &str,
        storage_key: String,
        duration_seconds: f64,
        patch_for: impl FnOnce(ArtifactRecord) -> JobPatch,
    ) -> Result<PollOutcome> {
        let size_bytes = match self.blobs.put_from_remote_url(&storage_key, output_url).await {
            Ok(size) => size,
            Err(err) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %err,
                    "Hand-off could not persist vendor output; surfacing vendor URL"
                );
                return Ok(PollOutcome::degraded(
                    output_url.to_string(),
                    format!("generated output could not be persisted: {}", err),
                ));
            }
        };

        let url = match self.artifact_url(&storage_key).await {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %err,
                    "Hand-off could not produce a durable URL; surfacing vendor URL"
                );
                return Ok(PollOutcome::degraded(
                    output_url.to_string(),
                    format!("generated output could not be persisted: {}", err),
                ));
            }
        };

        let artifact = ArtifactRecord {
            storage_key,
            url,
            duration_seconds,
            size_bytes,
            produced_at: Utc::now(),
        };
        self.jobs.patch(job_id, patch_for(artifact.clone())).await?;

        tracing::info!(job_id = %job_id, size_bytes, "External output handed off to blob store");
        Ok(PollOutcome::complete(artifact))
    }
}

/// Duration of the rendered video, preferring vendor frame counts.
fn render_duration_seconds(status: &RenderStatus, job: &VideoJob) -> f64 {
    match (status.duration_frames, status.fps) {
        (Some(frames), Some(fps)) if fps > 0.0 => frames as f64 / fps,
        _ => job
            .avatar_output
            .as_ref()
            .map(|a| a.duration_seconds)
            .unwrap_or(0.0),
    }
}
