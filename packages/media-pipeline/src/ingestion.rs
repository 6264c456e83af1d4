//! Ingestion-job progress for the multi-phase research pipeline.
//!
//! The research pipeline (web search → read → synthesize) runs elsewhere;
//! what lives here is its progress shape and an in-memory tracker that
//! implements [`BaseProgressSource`], so the same projector that streams
//! media jobs streams research jobs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::progress::{BaseProgressSource, ProgressSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Pending => "pending",
            IngestionStatus::Running => "running",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionPhase {
    pub name: String,
    pub status: IngestionStatus,
    pub produced_count: u32,
}

/// One research-ingestion unit: a flat progress projection of a
/// multi-phase job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionJob {
    pub id: Uuid,
    pub status: IngestionStatus,
    pub phases: Vec<IngestionPhase>,
    pub completed_units: u32,
    pub total_units: u32,
    pub error_message: Option<String>,
}

impl IngestionJob {
    pub fn percentage(&self) -> f32 {
        if self.status == IngestionStatus::Completed {
            return 100.0;
        }
        if self.total_units == 0 {
            return 0.0;
        }
        (self.completed_units as f32 / self.total_units as f32 * 100.0).min(100.0)
    }

    /// Name of the phase currently running, for display.
    pub fn current_phase(&self) -> &str {
        self.phases
            .iter()
            .find(|p| p.status == IngestionStatus::Running)
            .map(|p| p.name.as_str())
            .unwrap_or(match self.status {
                IngestionStatus::Pending => "Queued",
                IngestionStatus::Completed => "Done",
                IngestionStatus::Failed => "Failed",
                IngestionStatus::Running => "Working",
            })
    }
}

/// In-memory registry of ingestion jobs, shared between the pipeline
/// driving the work and the SSE endpoint streaming it.
#[derive(Default)]
pub struct IngestionTracker {
    jobs: RwLock<HashMap<Uuid, IngestionJob>>,
}

impl IngestionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, phase_names: &[&str], total_units: u32) -> Uuid {
        let id = Uuid::new_v4();
        let job = IngestionJob {
            id,
            status: IngestionStatus::Pending,
            phases: phase_names
                .iter()
                .map(|name| IngestionPhase {
                    name: (*name).to_string(),
                    status: IngestionStatus::Pending,
                    produced_count: 0,
                })
                .collect(),
            completed_units: 0,
            total_units,
            error_message: None,
        };
        self.jobs.write().expect("tracker lock poisoned").insert(id, job);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<IngestionJob> {
        self.jobs.read().expect("tracker lock poisoned").get(&id).cloned()
    }

    pub fn begin_phase(&self, id: Uuid, phase: &str) {
        self.update(id, |job| {
            job.status = IngestionStatus::Running;
            if let Some(p) = job.phases.iter_mut().find(|p| p.name == phase) {
                p.status = IngestionStatus::Running;
            }
        });
    }

    pub fn record_produced(&self, id: Uuid, phase: &str, produced: u32, units_done: u32) {
        self.update(id, |job| {
            if let Some(p) = job.phases.iter_mut().find(|p| p.name == phase) {
                p.produced_count += produced;
            }
            job.completed_units = (job.completed_units + units_done).min(job.total_units);
        });
    }

    pub fn complete_phase(&self, id: Uuid, phase: &str) {
        self.update(id, |job| {
            if let Some(p) = job.phases.iter_mut().find(|p| p.name == phase) {
                p.status = IngestionStatus::Completed;
            }
        });
    }

    pub fn complete(&self, id: Uuid) {
        self.update(id, |job| {
            job.status = IngestionStatus::Completed;
            job.completed_units = job.total_units;
            for p in &mut job.phases {
                p.status = IngestionStatus::Completed;
            }
        });
    }

    pub fn fail(&self, id: Uuid, message: impl Into<String>) {
        let message = message.into();
        self.update(id, move |job| {
            job.status = IngestionStatus::Failed;
            job.error_message = Some(message);
        });
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut IngestionJob)) {
        if let Some(job) = self.jobs.write().expect("tracker lock poisoned").get_mut(&id) {
            f(job);
        }
    }
}

#[async_trait]
impl BaseProgressSource for IngestionTracker {
    async fn sample(&self, job_id: Uuid) -> Result<ProgressSnapshot> {
        let job = self
            .get(job_id)
            .ok_or(PipelineError::JobNotFound { job_id })?;
        Ok(ProgressSnapshot {
            status: job.status.as_str().to_string(),
            phase: job.current_phase().to_string(),
            percentage: job.percentage(),
            stats: Some(serde_json::json!({
                "phases": job.phases,
                "completedUnits": job.completed_units,
                "totalUnits": job.total_units,
            })),
            error_message: job.error_message.clone(),
            terminal: job.status.is_terminal(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{spawn_projector, ProjectorConfig};
    use std::sync::Arc;

    #[test]
    fn percentage_tracks_completed_units() {
        let tracker = IngestionTracker::new();
        let id = tracker.create(&["search", "read", "synthesize"], 10);

        assert_eq!(tracker.get(id).unwrap().percentage(), 0.0);

        tracker.begin_phase(id, "search");
        tracker.record_produced(id, "search", 5, 4);
        assert_eq!(tracker.get(id).unwrap().percentage(), 40.0);

        tracker.complete(id);
        assert_eq!(tracker.get(id).unwrap().percentage(), 100.0);
    }

    #[test]
    fn current_phase_names_the_running_phase() {
        let tracker = IngestionTracker::new();
        let id = tracker.create(&["search", "read"], 4);
        assert_eq!(tracker.get(id).unwrap().current_phase(), "Queued");

        tracker.begin_phase(id, "search");
        assert_eq!(tracker.get(id).unwrap().current_phase(), "search");

        tracker.complete_phase(id, "search");
        tracker.begin_phase(id, "read");
        assert_eq!(tracker.get(id).unwrap().current_phase(), "read");
    }

    #[tokio::test(start_paused = true)]
    async fn projector_streams_ingestion_jobs_unchanged() {
        let tracker = Arc::new(IngestionTracker::new());
        let id = tracker.create(&["search", "read"], 2);

        tracker.begin_phase(id, "search");
        tracker.record_produced(id, "search", 3, 1);
        tracker.complete(id);

        let mut rx = spawn_projector(tracker, id, ProjectorConfig::default());
        let event = rx.recv().await.unwrap();
        // Terminal on first sample: single complete event, then close.
        assert_eq!(event.kind, "complete");
        assert_eq!(event.progress, 100.0);
        assert!(rx.recv().await.is_none());
    }
}
