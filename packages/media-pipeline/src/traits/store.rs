//! Job-store capability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::job::{JobPatch, NewVideoJob, VideoJob};

/// Persisted record of a job's current stage, status, artifacts, and error
/// detail: the single source of truth all stages read and mutate.
///
/// Mutations are targeted field patches, never whole-record overwrites.
/// Implementations must reject status writes that violate
/// [`crate::types::job::VideoStatus::can_transition_to`]. This core never
/// deletes jobs; retention is an external concern.
#[async_trait]
pub trait VideoJobStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<VideoJob>;

    async fn insert(&self, new: NewVideoJob) -> Result<VideoJob>;

    async fn patch(&self, id: Uuid, patch: JobPatch) -> Result<VideoJob>;
}
