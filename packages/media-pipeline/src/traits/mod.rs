//! Capability traits for dependency injection.
//!
//! These are infrastructure traits only. Stage logic lives in
//! [`crate::stages`] and uses these seams, so every vendor can be swapped
//! for the in-memory doubles in [`crate::testing`].
//!
//! Naming convention: `Base*` for capability trait names.

pub mod avatar;
pub mod blobs;
pub mod render;
pub mod speech;
pub mod store;

pub use avatar::{
    AssetKind, AvatarGenerationRequest, AvatarGenerationStatus, BaseAvatarGenerator,
};
pub use blobs::BaseBlobStore;
pub use render::{BaseRenderService, RenderStatus};
pub use speech::{BaseSpeechSynthesizer, SpeechRequest, SynthesizedAudio};
pub use store::VideoJobStore;

use serde::{Deserialize, Serialize};

/// State of a unit of work running inside a vendor's infrastructure,
/// observed only via polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalJobState {
    InProgress,
    Complete,
    Failed,
}
