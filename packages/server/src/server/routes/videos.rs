//! Video pipeline endpoints: job CRUD, stage starts, external-job polls.
//!
//! Stage starts for asynchronous stages return immediately with the
//! vendor's job id; the waiting burden is on the client's polling
//! cadence, never on a server thread held open for minutes.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use media_pipeline::{
    AvatarStageRequest, CharacterSource, NewVideoJob, PollOutcome, RenderStart, SpeechRequest,
    StageStart, TemplateType, VideoJob, VideoJobStore, VideoSettings,
};

use super::ApiError;
use crate::server::app::AxumAppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoRequest {
    #[serde(default)]
    pub template_type: TemplateType,
    #[serde(default)]
    pub source_config: serde_json::Value,
    #[serde(default)]
    pub video_settings: VideoSettings,
    pub lesson_content: Option<serde_json::Value>,
}

/// POST /api/videos
pub async fn create_video_handler(
    Extension(state): Extension<AxumAppState>,
    Json(body): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<VideoJob>), ApiError> {
    let mut new_job = NewVideoJob::builder()
        .template_type(body.template_type)
        .source_config(body.source_config)
        .video_settings(body.video_settings)
        .build();
    new_job.lesson_content = body.lesson_content;

    let job = state.kernel.pipeline.jobs().insert(new_job).await?;
    tracing::info!(job_id = %job.id, "Video job created");
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/videos/:id
pub async fn get_video_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoJob>, ApiError> {
    let job = state.kernel.pipeline.jobs().get(id).await?;
    Ok(Json(job))
}

/// POST /api/videos/:id/cancel
pub async fn cancel_video_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoJob>, ApiError> {
    let job = state.kernel.pipeline.cancel(id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettingsBody {
    pub speed: Option<f32>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAudioRequest {
    pub script: String,
    pub voice_id: String,
    pub voice_provider: Option<String>,
    pub voice_settings: Option<VoiceSettingsBody>,
}

/// POST /api/videos/:id/audio
pub async fn start_audio_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StartAudioRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let synth = state
        .kernel
        .synthesizers
        .resolve(body.voice_provider.as_deref())
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "unknown voice provider: {}",
                body.voice_provider.as_deref().unwrap_or("(default)")
            ))
        })?;

    let (speed, language) = body
        .voice_settings
        .map(|s| (s.speed, s.language))
        .unwrap_or((None, None));

    let artifact = state
        .kernel
        .pipeline
        .start_audio(
            id,
            SpeechRequest {
                script: body.script,
                voice_id: body.voice_id,
                speed,
                language,
            },
            synth.as_ref(),
        )
        .await?;

    Ok(Json(json!({ "audioOutput": artifact })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAvatarRequest {
    /// Echo of the audio artifact URL, for request tracing only; the
    /// persisted artifact is authoritative.
    pub audio_url: Option<String>,
    pub character_id: Option<String>,
    pub character_image_url: Option<String>,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub text_prompt: Option<String>,
}

/// POST /api/videos/:id/avatar
pub async fn start_avatar_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StartAvatarRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(audio_url) = &body.audio_url {
        tracing::debug!(job_id = %id, audio_url = %audio_url, "Avatar start request");
    }
    let character = match (body.character_id, body.character_image_url) {
        (Some(id), _) => CharacterSource::Reference(id),
        (None, Some(url)) => CharacterSource::ImageUrl(url),
        (None, None) => {
            return Err(ApiError::bad_request(
                "characterId or characterImageUrl is required",
            ))
        }
    };

    let started = state
        .kernel
        .pipeline
        .start_avatar(
            id,
            AvatarStageRequest {
                character,
                resolution: body.resolution,
                aspect_ratio: body.aspect_ratio,
                text_prompt: body.text_prompt,
            },
        )
        .await?;

    let response = match started {
        StageStart::Started { external_id } => {
            json!({ "externalJobId": external_id, "alreadyRunning": false })
        }
        StageStart::AlreadyRunning { external_id } => {
            json!({ "externalJobId": external_id, "alreadyRunning": true })
        }
        StageStart::AlreadyComplete { artifact } => {
            json!({ "avatarOutput": artifact })
        }
    };
    Ok(Json(response))
}

/// GET /api/videos/:id/avatar/poll
pub async fn poll_avatar_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.kernel.pipeline.poll_avatar(id).await?;
    Ok(Json(poll_response(outcome)))
}

/// POST /api/videos/:id/render
pub async fn start_render_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let started = state.kernel.pipeline.start_render(id).await?;

    let response = match started {
        RenderStart::Started {
            external_id,
            composition_id,
        } => json!({
            "externalJobId": external_id,
            "compositionId": composition_id,
            "alreadyRunning": false,
        }),
        RenderStart::AlreadyRunning {
            external_id,
            composition_id,
        } => json!({
            "externalJobId": external_id,
            "compositionId": composition_id,
            "alreadyRunning": true,
        }),
        RenderStart::AlreadyComplete { artifact } => json!({
            "videoUrl": artifact.url,
            "finalOutput": artifact,
        }),
        RenderStart::NotConfigured {
            composition_id,
            input_props,
        } => json!({
            "error": "render service not configured",
            "compositionId": composition_id,
            "inputProps": input_props,
        }),
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRenderQuery {
    pub video_id: Uuid,
}

/// GET /api/videos/render/:external_id?videoId=...
///
/// The first invocation that observes `complete` performs the artifact
/// hand-off as a side effect of this same call.
pub async fn poll_render_handler(
    Extension(state): Extension<AxumAppState>,
    Path(external_id): Path<String>,
    Query(query): Query<PollRenderQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .kernel
        .pipeline
        .poll_render(query.video_id, &external_id)
        .await?;
    Ok(Json(poll_response(outcome)))
}

fn poll_response(outcome: PollOutcome) -> serde_json::Value {
    let video_url = outcome
        .artifact
        .as_ref()
        .map(|a| a.url.clone())
        .or(outcome.fallback_url);
    json!({
        "status": outcome.state,
        "progress": outcome.progress,
        "videoUrl": video_url,
        "artifact": outcome.artifact,
        "warning": outcome.warning,
        "error": outcome.error_message,
    })
}
