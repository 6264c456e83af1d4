//! Postgres implementation of the VideoJobStore capability.
//!
//! Patches compile to one targeted UPDATE touching only the fields
//! present in the JobPatch, so concurrent unrelated updates (a
//! cancellation racing a poller's artifact write) cannot clobber each
//! other. Status writes are validated against the forward-only transition
//! rules under a row lock.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use media_pipeline::{
    ArtifactRecord, ExternalJobRef, JobPatch, NewVideoJob, PipelineError, VideoJob, VideoJobStore,
    VideoSettings, VideoStatus,
};

pub struct PgVideoJobStore {
    pool: PgPool,
}

impl PgVideoJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(err: sqlx::Error) -> PipelineError {
    PipelineError::Store(err.to_string())
}

fn artifact_from_json(
    value: Option<serde_json::Value>,
    column: &str,
) -> Result<Option<ArtifactRecord>, PipelineError> {
    match value {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| PipelineError::Store(format!("corrupt {column}: {e}"))),
    }
}

fn artifact_to_json(artifact: &ArtifactRecord) -> Result<serde_json::Value, PipelineError> {
    serde_json::to_value(artifact).map_err(|e| PipelineError::Store(e.to_string()))
}

fn row_to_job(row: &PgRow) -> Result<VideoJob, PipelineError> {
    let video_settings: serde_json::Value = row.try_get("video_settings").map_err(store_err)?;
    let video_settings: VideoSettings =
        serde_json::from_value(video_settings).unwrap_or_default();

    let external_provider: Option<String> =
        row.try_get("external_provider").map_err(store_err)?;
    let external_job_id: Option<String> = row.try_get("external_job_id").map_err(store_err)?;
    let external_job = match (external_provider, external_job_id) {
        (Some(provider), Some(external_id)) => Some(ExternalJobRef {
            provider,
            external_id,
        }),
        _ => None,
    };

    Ok(VideoJob {
        id: row.try_get("id").map_err(store_err)?,
        status: row.try_get("status").map_err(store_err)?,
        template_type: row.try_get("template_type").map_err(store_err)?,
        source_config: row.try_get("source_config").map_err(store_err)?,
        video_settings,
        lesson_content: row.try_get("lesson_content").map_err(store_err)?,
        audio_output: artifact_from_json(
            row.try_get("audio_output").map_err(store_err)?,
            "audio_output",
        )?,
        avatar_output: artifact_from_json(
            row.try_get("avatar_output").map_err(store_err)?,
            "avatar_output",
        )?,
        final_output: artifact_from_json(
            row.try_get("final_output").map_err(store_err)?,
            "final_output",
        )?,
        external_job,
        error_message: row.try_get("error_message").map_err(store_err)?,
        error_step: row.try_get("error_step").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

#[async_trait]
impl VideoJobStore for PgVideoJobStore {
    async fn get(&self, id: Uuid) -> Result<VideoJob, PipelineError> {
        let row = sqlx::query("SELECT * FROM video_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or(PipelineError::JobNotFound { job_id: id })?;
        row_to_job(&row)
    }

    async fn insert(&self, new: NewVideoJob) -> Result<VideoJob, PipelineError> {
        let video_settings = serde_json::to_value(&new.video_settings)
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        let row = sqlx::query(
            r#"
            INSERT INTO video_jobs
                (id, status, template_type, source_config, video_settings, lesson_content,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(VideoStatus::Pending)
        .bind(new.template_type)
        .bind(new.source_config)
        .bind(video_settings)
        .bind(new.lesson_content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        row_to_job(&row)
    }

    async fn patch(&self, id: Uuid, patch: JobPatch) -> Result<VideoJob, PipelineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query("SELECT * FROM video_jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or(PipelineError::JobNotFound { job_id: id })?;
        let current = row_to_job(&row)?;

        if let Some(next) = patch.status {
            if !current.status.can_transition_to(next) {
                return Err(PipelineError::InvalidTransition {
                    from: current.status,
                    to: next,
                });
            }
        }
        if patch.is_empty() {
            return Ok(current);
        }

        let mut query = QueryBuilder::new("UPDATE video_jobs SET updated_at = NOW()");
        if let Some(status) = patch.status {
            query.push(", status = ").push_bind(status);
        }
        if let Some(content) = patch.lesson_content {
            query.push(", lesson_content = ").push_bind(content);
        }
        if let Some(artifact) = &patch.audio_output {
            query.push(", audio_output = ").push_bind(artifact_to_json(artifact)?);
        }
        if let Some(artifact) = &patch.avatar_output {
            query.push(", avatar_output = ").push_bind(artifact_to_json(artifact)?);
        }
        if let Some(artifact) = &patch.final_output {
            query.push(", final_output = ").push_bind(artifact_to_json(artifact)?);
        }
        if let Some(external) = patch.external_job {
            match external {
                Some(external) => {
                    query.push(", external_provider = ").push_bind(external.provider);
                    query.push(", external_job_id = ").push_bind(external.external_id);
                }
                None => {
                    query.push(", external_provider = NULL, external_job_id = NULL");
                }
            }
        }
        if let Some(message) = patch.error_message {
            query.push(", error_message = ").push_bind(message);
        }
        if let Some(step) = patch.error_step {
            query.push(", error_step = ").push_bind(step);
        }
        query.push(" WHERE id = ").push_bind(id);
        query.push(" RETURNING *");

        let row = query.build().fetch_one(&mut *tx).await.map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;
        row_to_job(&row)
    }
}
