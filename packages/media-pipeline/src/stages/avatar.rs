//! Avatar stage: audio artifact + character → vendor generation job.
//!
//! The vendor cannot fetch from arbitrary URLs, so the audio (and the
//! character image, when given by URL) is downloaded from the blob store's
//! signed URL and re-uploaded as a vendor asset. The driver starts the
//! generation and returns immediately; completion is observed only via the
//! poller.

use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::pipeline::{MediaPipeline, StageStart};
use crate::retry::retry_with_backoff;
use crate::traits::{
    AssetKind, AvatarGenerationRequest, BaseAvatarGenerator, BaseBlobStore, VideoJobStore,
};
use crate::types::job::{ExternalJobRef, JobPatch, StageKind, VideoStatus};

/// The character to animate: a vendor-side reference id, or an image to
/// upload.
#[derive(Debug, Clone)]
pub enum CharacterSource {
    Reference(String),
    ImageUrl(String),
}

#[derive(Debug, Clone)]
pub struct AvatarStageRequest {
    pub character: CharacterSource,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub text_prompt: Option<String>,
}

impl MediaPipeline {
    pub async fn start_avatar(&self, job_id: Uuid, req: AvatarStageRequest) -> Result<StageStart> {
        let job = self.load_actionable(job_id).await?;

        // Duplicate start while generation is mid-flight: no-op returning
        // the live external reference.
        if let Some(external) = &job.external_job {
            if job.status == VideoStatus::AvatarGenerating {
                tracing::info!(job_id = %job_id, external_id = %external.external_id, "Avatar generation already running");
                return Ok(StageStart::AlreadyRunning {
                    external_id: external.external_id.clone(),
                });
            }
        }
        if let Some(artifact) = &job.avatar_output {
            if job.external_job.is_none() {
                return Ok(StageStart::AlreadyComplete {
                    artifact: artifact.clone(),
                });
            }
        }

        // Preconditions, checked before any vendor call.
        let audio = job.audio_output.clone().ok_or(PipelineError::Precondition {
            stage: StageKind::AvatarGeneration,
            missing: "audio_output",
        })?;
        match job.status {
            VideoStatus::AudioGenerating | VideoStatus::AvatarGenerating => {}
            status => {
                return Err(PipelineError::WrongStatus {
                    stage: StageKind::AvatarGeneration,
                    status,
                })
            }
        }

        let provider = self.avatar.provider().to_string();
        tracing::info!(job_id = %job_id, provider = %provider, "Starting avatar generation");

        // Two-step upload: blob store signed URL → bytes → vendor asset.
        let audio_bytes = match self
            .blobs
            .signed_url(&audio.storage_key, self.config.signed_url_ttl())
            .await
        {
            Ok(signed) => match self.blobs.fetch(&signed).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    return Err(self
                        .fail_stage(job_id, StageKind::AvatarGeneration, err.into())
                        .await)
                }
            },
            Err(err) => {
                return Err(self
                    .fail_stage(job_id, StageKind::AvatarGeneration, err.into())
                    .await)
            }
        };

        let audio_asset_id = match self
            .upload_vendor_asset(job_id, "lesson-audio", AssetKind::Audio, audio_bytes, "audio/mpeg")
            .await
        {
            Ok(id) => id,
            Err(err) => {
                return Err(self
                    .fail_stage(job_id, StageKind::AvatarGeneration, err)
                    .await)
            }
        };

        let character_asset_id = match &req.character {
            CharacterSource::Reference(id) => id.clone(),
            CharacterSource::ImageUrl(url) => {
                let image_bytes = match self.blobs.fetch(url).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        return Err(self
                            .fail_stage(job_id, StageKind::AvatarGeneration, err.into())
                            .await)
                    }
                };
                match self
                    .upload_vendor_asset(
                        job_id,
                        "character-image",
                        AssetKind::Image,
                        image_bytes,
                        "image/png",
                    )
                    .await
                {
                    Ok(id) => id,
                    Err(err) => {
                        return Err(self
                            .fail_stage(job_id, StageKind::AvatarGeneration, err)
                            .await)
                    }
                }
            }
        };

        let generation = AvatarGenerationRequest {
            audio_asset_id,
            character_asset_id,
            resolution: req.resolution.clone(),
            aspect_ratio: req.aspect_ratio.clone(),
            text_prompt: req.text_prompt.clone(),
        };

        let on_retry = Self::log_retry(job_id, provider.clone(), "avatar generation start");
        let external_id = match retry_with_backoff(&self.config.retry, Some(&on_retry), || async {
            self.spacer
                .space(&provider, self.config.spacing.avatar)
                .await;
            self.avatar.start_generation(&generation).await
        })
        .await
        {
            Ok(id) => id,
            Err(err) => {
                return Err(self
                    .fail_stage(job_id, StageKind::AvatarGeneration, err.into())
                    .await)
            }
        };

        self.jobs
            .patch(
                job_id,
                JobPatch {
                    status: Some(VideoStatus::AvatarGenerating),
                    external_job: Some(Some(ExternalJobRef {
                        provider: provider.clone(),
                        external_id: external_id.clone(),
                    })),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(job_id = %job_id, external_id = %external_id, "Avatar generation started");
        Ok(StageStart::Started { external_id })
    }

    /// Create a vendor asset and upload its bytes, each call retried and
    /// spaced independently.
    async fn upload_vendor_asset(
        &self,
        job_id: Uuid,
        name: &str,
        kind: AssetKind,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let provider = self.avatar.provider().to_string();

        let on_create = Self::log_retry(job_id, provider.clone(), "avatar asset create");
        let asset_id = retry_with_backoff(&self.config.retry, Some(&on_create), || async {
            self.spacer
                .space(&provider, self.config.spacing.avatar)
                .await;
            self.avatar.create_asset(name, kind).await
        })
        .await?;

        let on_upload = Self::log_retry(job_id, provider.clone(), "avatar asset upload");
        retry_with_backoff(&self.config.retry, Some(&on_upload), || {
            let bytes = bytes.clone();
            async {
                self.spacer
                    .space(&provider, self.config.spacing.avatar)
                    .await;
                self.avatar
                    .upload_asset(&asset_id, bytes, content_type)
                    .await
            }
        })
        .await?;

        tracing::debug!(job_id = %job_id, asset_id = %asset_id, kind = kind.as_str(), "Vendor asset uploaded");
        Ok(asset_id)
    }
}
