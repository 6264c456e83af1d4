//! Audio stage: script → synthesized speech → blob store artifact.
//!
//! Synchronous within the request: the TTS call is retried and spaced,
//! the bytes are persisted, and the artifact is written before returning.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::pipeline::MediaPipeline;
use crate::retry::retry_with_backoff;
use crate::traits::{BaseBlobStore, BaseSpeechSynthesizer, SpeechRequest, VideoJobStore};
use crate::types::job::{ArtifactRecord, JobPatch, StageKind, VideoStatus};

/// Assumed MP3 bitrate when the vendor reports no duration; both TTS
/// vendors are asked for 128 kbps output.
const AUDIO_BITRATE_KBPS: u64 = 128;

fn estimate_duration_seconds(byte_length: usize) -> f64 {
    byte_length as f64 / (AUDIO_BITRATE_KBPS as f64 * 1000.0 / 8.0)
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}

impl MediaPipeline {
    /// Run the audio stage. The synthesizer is injected per call because
    /// the voice provider is chosen per request.
    pub async fn start_audio(
        &self,
        job_id: Uuid,
        req: SpeechRequest,
        synth: &dyn BaseSpeechSynthesizer,
    ) -> Result<ArtifactRecord> {
        let job = self.load_actionable(job_id).await?;

        // Duplicate start after the pipeline moved on: no-op returning the
        // existing artifact.
        if let Some(existing) = &job.audio_output {
            if !matches!(
                job.status,
                VideoStatus::Pending | VideoStatus::AudioGenerating
            ) {
                tracing::info!(job_id = %job_id, "Audio already generated; returning existing artifact");
                return Ok(existing.clone());
            }
        }

        match job.status {
            VideoStatus::Pending | VideoStatus::AudioGenerating => {}
            status => {
                return Err(PipelineError::WrongStatus {
                    stage: StageKind::AudioGeneration,
                    status,
                })
            }
        }

        if job.status == VideoStatus::Pending {
            self.jobs
                .patch(job_id, JobPatch::status(VideoStatus::AudioGenerating))
                .await?;
        }

        let provider = synth.provider().to_string();
        tracing::info!(job_id = %job_id, provider = %provider, voice_id = %req.voice_id, "Starting speech synthesis");

        let on_retry = Self::log_retry(job_id, provider.clone(), "speech synthesis");
        let audio = match retry_with_backoff(&self.config.retry, Some(&on_retry), || async {
            self.spacer.space(&provider, self.config.spacing.tts).await;
            synth.synthesize(&req).await
        })
        .await
        {
            Ok(audio) => audio,
            Err(err) => {
                return Err(self
                    .fail_stage(job_id, StageKind::AudioGeneration, err.into())
                    .await)
            }
        };

        let duration_seconds = audio
            .duration_seconds
            .unwrap_or_else(|| estimate_duration_seconds(audio.bytes.len()));
        let size_bytes = audio.bytes.len() as i64;
        let storage_key = format!(
            "videos/{}/audio/{}.{}",
            job_id,
            Utc::now().timestamp_millis(),
            extension_for(&audio.content_type)
        );

        if let Err(err) = self
            .blobs
            .put(&storage_key, audio.bytes, &audio.content_type)
            .await
        {
            return Err(self
                .fail_stage(job_id, StageKind::AudioGeneration, err.into())
                .await);
        }

        let url = match self.artifact_url(&storage_key).await {
            Ok(url) => url,
            Err(err) => {
                return Err(self
                    .fail_stage(job_id, StageKind::AudioGeneration, err.into())
                    .await)
            }
        };

        let artifact = ArtifactRecord {
            storage_key,
            url,
            duration_seconds,
            size_bytes,
            produced_at: Utc::now(),
        };

        self.jobs
            .patch(
                job_id,
                JobPatch {
                    audio_output: Some(artifact.clone()),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            job_id = %job_id,
            size_bytes,
            duration_seconds,
            "Audio artifact persisted"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_estimate_follows_bitrate_formula() {
        // 128 kbps → 16,000 bytes per second.
        assert_eq!(estimate_duration_seconds(16_000), 1.0);
        assert_eq!(estimate_duration_seconds(160_000), 10.0);
    }

    #[test]
    fn extension_maps_common_audio_types() {
        assert_eq!(extension_for("audio/mpeg"), "mp3");
        assert_eq!(extension_for("audio/wav"), "wav");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }
}
