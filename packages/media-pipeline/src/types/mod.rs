//! Core data types.

pub mod job;

pub use job::{
    ArtifactRecord, ExternalJobRef, JobPatch, NewVideoJob, StageKind, TemplateType, VideoJob,
    VideoSettings, VideoStatus,
};
