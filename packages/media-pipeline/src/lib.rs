//! Asynchronous multi-stage media-generation pipeline.
//!
//! Turns a lesson script into a finished teaching video by driving three
//! independent, slow, rate-limited external services (speech synthesis,
//! avatar generation, rendering), persisting job progress between stages,
//! retrying transient failures with backoff, spacing request bursts per
//! provider, and projecting live progress to clients that cannot hold a
//! request open for the whole duration.
//!
//! Long-running external work is modeled as "start now, observe later via
//! poll": start endpoints return immediately with an external job id, and
//! each poll invocation performs exactly one vendor status check plus, on
//! terminal success, an idempotent artifact hand-off into the blob store.
//!
//! Every external dependency sits behind a capability trait so the whole
//! pipeline runs against the in-memory doubles in [`testing`].

pub mod error;
pub mod ingestion;
pub mod pipeline;
pub mod poller;
pub mod progress;
pub mod retry;
pub mod spacing;
pub mod stages;
pub mod testing;
pub mod traits;
pub mod types;

pub use error::{
    truncate_error, BlobError, PipelineError, ProviderError, Result, RetryClass,
    MAX_ERROR_MESSAGE_LEN,
};
pub use ingestion::{IngestionJob, IngestionPhase, IngestionStatus, IngestionTracker};
pub use pipeline::{
    MediaPipeline, PipelineConfig, PollOutcome, RenderProfile, RenderStart, SpacingConfig,
    StageStart,
};
pub use progress::{
    spawn_projector, BaseProgressSource, ProgressEvent, ProgressSnapshot, ProjectorConfig,
    VideoJobProgressSource,
};
pub use retry::{retry_with_backoff, RetryConfig};
pub use spacing::RequestSpacer;
pub use stages::{AvatarStageRequest, CharacterSource};
pub use traits::{
    AssetKind, AvatarGenerationRequest, AvatarGenerationStatus, BaseAvatarGenerator,
    BaseBlobStore, BaseRenderService, BaseSpeechSynthesizer, ExternalJobState, RenderStatus,
    SpeechRequest, SynthesizedAudio, VideoJobStore,
};
pub use types::{
    ArtifactRecord, ExternalJobRef, JobPatch, NewVideoJob, StageKind, TemplateType, VideoJob,
    VideoSettings, VideoStatus,
};
