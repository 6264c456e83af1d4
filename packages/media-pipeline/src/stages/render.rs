//! Render stage: avatar video + lesson content → render-farm job.
//!
//! The composition is selected by the job's template type and fed an
//! input-props payload. The driver submits and returns immediately;
//! completion is observed only via the poller.

use serde_json::json;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::pipeline::{MediaPipeline, RenderStart};
use crate::retry::retry_with_backoff;
use crate::traits::{BaseBlobStore, BaseRenderService, VideoJobStore};
use crate::types::job::{ExternalJobRef, JobPatch, StageKind, VideoJob, VideoStatus};

impl MediaPipeline {
    pub async fn start_render(&self, job_id: Uuid) -> Result<RenderStart> {
        let job = self.load_actionable(job_id).await?;
        let composition_id = job.template_type.composition_id();

        if let Some(external) = &job.external_job {
            if job.status == VideoStatus::Rendering {
                tracing::info!(job_id = %job_id, external_id = %external.external_id, "Render already running");
                return Ok(RenderStart::AlreadyRunning {
                    external_id: external.external_id.clone(),
                    composition_id,
                });
            }
        }
        if let Some(artifact) = &job.final_output {
            return Ok(RenderStart::AlreadyComplete {
                artifact: artifact.clone(),
            });
        }

        // Preconditions, checked before any vendor call.
        let avatar = job.avatar_output.clone().ok_or(PipelineError::Precondition {
            stage: StageKind::Rendering,
            missing: "avatar_output",
        })?;
        if job.lesson_content.is_none() {
            return Err(PipelineError::Precondition {
                stage: StageKind::Rendering,
                missing: "lesson_content",
            });
        }
        match job.status {
            VideoStatus::AvatarGenerating | VideoStatus::Rendering => {}
            status => {
                return Err(PipelineError::WrongStatus {
                    stage: StageKind::Rendering,
                    status,
                })
            }
        }

        // Prefer the publicly cached URL: no minting latency and no
        // validity window for a long render to outlive.
        let avatar_url = match self.blobs.public_url(&avatar.storage_key) {
            Some(url) => url,
            None => match self
                .blobs
                .signed_url(&avatar.storage_key, self.config.signed_url_ttl())
                .await
            {
                Ok(url) => url,
                Err(err) => {
                    return Err(self.fail_stage(job_id, StageKind::Rendering, err.into()).await)
                }
            },
        };

        let input_props = self.render_input_props(&job, &avatar_url, avatar.duration_seconds);

        if !self.render.is_configured() {
            tracing::warn!(job_id = %job_id, composition_id, "Render service not configured; returning input props");
            return Ok(RenderStart::NotConfigured {
                composition_id,
                input_props,
            });
        }

        let provider = self.render.provider().to_string();
        tracing::info!(job_id = %job_id, provider = %provider, composition_id, "Submitting render");

        let on_retry = Self::log_retry(job_id, provider.clone(), "render submit");
        let external_id = match retry_with_backoff(&self.config.retry, Some(&on_retry), || async {
            self.spacer
                .space(&provider, self.config.spacing.render)
                .await;
            self.render.start_render(composition_id, &input_props).await
        })
        .await
        {
            Ok(id) => id,
            Err(err) => {
                return Err(self.fail_stage(job_id, StageKind::Rendering, err.into()).await)
            }
        };

        self.jobs
            .patch(
                job_id,
                JobPatch {
                    status: Some(VideoStatus::Rendering),
                    external_job: Some(Some(ExternalJobRef {
                        provider: provider.clone(),
                        external_id: external_id.clone(),
                    })),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(job_id = %job_id, external_id = %external_id, "Render started");
        Ok(RenderStart::Started {
            external_id,
            composition_id,
        })
    }

    fn render_input_props(
        &self,
        job: &VideoJob,
        avatar_url: &str,
        avatar_duration_seconds: f64,
    ) -> serde_json::Value {
        json!({
            "lessonContent": job.lesson_content,
            "avatarVideoUrl": avatar_url,
            "avatarDurationSeconds": avatar_duration_seconds,
            "brandColors": {
                "primary": self.config.render.brand_primary,
                "secondary": self.config.render.brand_secondary,
            },
            "captions": {
                "enabled": job.video_settings.captions_enabled,
            },
            "aspectRatio": job.video_settings.aspect_ratio,
            "resolution": job.video_settings.resolution,
        })
    }
}
