//! Progress projection for long-lived client streams.
//!
//! A generic sample → de-duplicate → emit loop over any
//! [`BaseProgressSource`], independent of which pipeline produced the
//! progress. The SSE endpoint wraps the emitted channel; clients that
//! cannot hold a request open for the whole job duration subscribe here
//! instead of polling from the browser.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::traits::VideoJobStore;
use crate::types::job::VideoStatus;

/// One sampled view of a job's persisted progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Raw status string as persisted.
    pub status: String,
    /// Human-readable phase label. Presentation only.
    pub phase: String,
    pub percentage: f32,
    pub stats: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub terminal: bool,
}

/// Anything whose persisted progress can be sampled by job id.
#[async_trait]
pub trait BaseProgressSource: Send + Sync {
    async fn sample(&self, job_id: Uuid) -> Result<ProgressSnapshot>;
}

/// Event pushed to a subscribed client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub phase: String,
    pub status: String,
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProgressEvent {
    fn from_snapshot(snapshot: &ProgressSnapshot) -> Self {
        let kind = if !snapshot.terminal {
            "progress"
        } else if snapshot.status == "completed" {
            "complete"
        } else {
            "error"
        };
        Self {
            kind,
            phase: snapshot.phase.clone(),
            status: snapshot.status.clone(),
            progress: snapshot.percentage,
            stats: snapshot.stats.clone(),
            error_message: snapshot.error_message.clone(),
        }
    }

    fn sampling_error(message: String) -> Self {
        Self {
            kind: "error",
            phase: "Error".to_string(),
            status: "error".to_string(),
            progress: 0.0,
            stats: None,
            error_message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectorConfig {
    pub poll_interval: Duration,
    /// Wall-clock budget for one stream. The stream closes when it
    /// elapses even if the job never reaches a terminal state.
    pub max_duration: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_duration: Duration::from_secs(600),
        }
    }
}

/// Spawn the projection loop for one job. Events arrive on the returned
/// channel; the channel closes when the job reaches a terminal state, the
/// budget elapses, sampling fails, or the subscriber goes away.
///
/// Emission is strictly change-only: an event goes out only when status
/// or percentage differs from the last emission. This is what keeps the
/// stream low-bandwidth.
pub fn spawn_projector(
    source: Arc<dyn BaseProgressSource>,
    job_id: Uuid,
    config: ProjectorConfig,
) -> mpsc::Receiver<ProgressEvent> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        let mut last_emitted: Option<(String, f32)> = None;
        loop {
            match source.sample(job_id).await {
                Err(err) => {
                    // Never leave a stream open after an unrecoverable
                    // sampling failure.
                    let _ = tx
                        .send(ProgressEvent::sampling_error(err.to_string()))
                        .await;
                    break;
                }
                Ok(snapshot) => {
                    let key = (snapshot.status.clone(), snapshot.percentage);
                    if last_emitted.as_ref() != Some(&key) {
                        if tx.send(ProgressEvent::from_snapshot(&snapshot)).await.is_err() {
                            break;
                        }
                        last_emitted = Some(key);
                    }
                    if snapshot.terminal {
                        break;
                    }
                }
            }
            if started.elapsed() >= config.max_duration {
                tracing::debug!(job_id = %job_id, "Progress stream budget elapsed");
                break;
            }
            tokio::time::sleep(config.poll_interval).await;
        }
    });
    rx
}

/// Progress source over the media job store.
pub struct VideoJobProgressSource {
    jobs: Arc<dyn VideoJobStore>,
}

impl VideoJobProgressSource {
    pub fn new(jobs: Arc<dyn VideoJobStore>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl BaseProgressSource for VideoJobProgressSource {
    async fn sample(&self, job_id: Uuid) -> Result<ProgressSnapshot> {
        let job = self.jobs.get(job_id).await?;

        let percentage = match job.status {
            VideoStatus::Pending => 0.0,
            VideoStatus::AudioGenerating => {
                if job.audio_output.is_some() {
                    33.0
                } else {
                    10.0
                }
            }
            VideoStatus::AvatarGenerating => {
                if job.avatar_output.is_some() {
                    66.0
                } else {
                    40.0
                }
            }
            VideoStatus::Rendering => 80.0,
            VideoStatus::Completed => 100.0,
            // Show how far a dead job got.
            VideoStatus::Failed | VideoStatus::Cancelled => {
                if job.avatar_output.is_some() {
                    66.0
                } else if job.audio_output.is_some() {
                    33.0
                } else {
                    0.0
                }
            }
        };

        Ok(ProgressSnapshot {
            status: job.status.as_str().to_string(),
            phase: job.status.phase_label().to_string(),
            percentage,
            stats: Some(serde_json::json!({
                "audioReady": job.audio_output.is_some(),
                "avatarReady": job.avatar_output.is_some(),
                "finalReady": job.final_output.is_some(),
            })),
            error_message: job.error_message.clone(),
            terminal: job.status.is_terminal(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProgressSource;

    fn snapshot(percentage: f32, terminal: bool) -> ProgressSnapshot {
        ProgressSnapshot {
            status: if terminal { "completed" } else { "rendering" }.to_string(),
            phase: "Rendering video".to_string(),
            percentage,
            stats: None,
            error_message: None,
            terminal,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_only_on_change() {
        let source = ScriptedProgressSource::new(vec![
            snapshot(10.0, false),
            snapshot(10.0, false),
            snapshot(10.0, false),
            snapshot(20.0, false),
            snapshot(20.0, false),
            snapshot(100.0, true),
        ]);

        let mut rx = spawn_projector(Arc::new(source), Uuid::new_v4(), ProjectorConfig::default());

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].progress, 10.0);
        assert_eq!(events[1].progress, 20.0);
        assert_eq!(events[2].progress, 100.0);
        assert_eq!(events[2].kind, "complete");
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_error_closes_the_stream_with_one_event() {
        let source = ScriptedProgressSource::new(vec![]);
        let mut rx = spawn_projector(Arc::new(source), Uuid::new_v4(), ProjectorConfig::default());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "error");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_closes_when_budget_elapses() {
        let source =
            ScriptedProgressSource::new(vec![snapshot(10.0, false)]).repeating_last();
        let mut rx = spawn_projector(
            Arc::new(source),
            Uuid::new_v4(),
            ProjectorConfig {
                poll_interval: Duration::from_secs(2),
                max_duration: Duration::from_secs(7),
            },
        );

        // One event (nothing changes afterwards), then the budget closes
        // the stream.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.progress, 10.0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_emits_error_event() {
        let mut failed = snapshot(33.0, true);
        failed.status = "failed".to_string();
        failed.error_message = Some("out of memory".to_string());
        let source = ScriptedProgressSource::new(vec![failed]);

        let mut rx = spawn_projector(Arc::new(source), Uuid::new_v4(), ProjectorConfig::default());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "error");
        assert_eq!(event.error_message.as_deref(), Some("out of memory"));
        assert!(rx.recv().await.is_none());
    }
}
