//! Video job model: the single source of truth every stage reads and
//! mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

/// Job status. Advances forward through the stage sequence or jumps to
/// `Failed`/`Cancelled`; never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "video_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Pending,
    AudioGenerating,
    AvatarGenerating,
    Rendering,
    Completed,
    Failed,
    Cancelled,
}

impl VideoStatus {
    /// Position in the forward stage sequence. Terminal failure states have
    /// no position.
    fn sequence(&self) -> Option<u8> {
        match self {
            VideoStatus::Pending => Some(0),
            VideoStatus::AudioGenerating => Some(1),
            VideoStatus::AvatarGenerating => Some(2),
            VideoStatus::Rendering => Some(3),
            VideoStatus::Completed => Some(4),
            VideoStatus::Failed | VideoStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoStatus::Completed | VideoStatus::Failed | VideoStatus::Cancelled
        )
    }

    /// Whether a status write from `self` to `next` is legal: forward
    /// through the sequence, or a jump to `Failed`/`Cancelled` from any
    /// non-terminal state. Writing the current status again is a no-op and
    /// always legal.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.sequence(), next.sequence()) {
            (Some(from), Some(to)) => to > from,
            // Failed / Cancelled reachable from any non-terminal state.
            (_, None) => true,
            (None, _) => false,
        }
    }

    /// Human-readable phase label for progress streams. Presentation only;
    /// never feeds back into state transitions.
    pub fn phase_label(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "Waiting to start",
            VideoStatus::AudioGenerating => "Generating audio",
            VideoStatus::AvatarGenerating => "Animating avatar",
            VideoStatus::Rendering => "Rendering video",
            VideoStatus::Completed => "Completed",
            VideoStatus::Failed => "Failed",
            VideoStatus::Cancelled => "Cancelled",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::AudioGenerating => "audio_generating",
            VideoStatus::AvatarGenerating => "avatar_generating",
            VideoStatus::Rendering => "rendering",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
            VideoStatus::Cancelled => "cancelled",
        }
    }
}

/// Which stage failed, for operator triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "stage_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    AudioGeneration,
    AvatarGeneration,
    Rendering,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::AudioGeneration => "audio_generation",
            StageKind::AvatarGeneration => "avatar_generation",
            StageKind::Rendering => "rendering",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render composition selector. Affects Stage 3 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "template_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    #[default]
    Conversation,
    VocabDrill,
    StoryTime,
}

impl TemplateType {
    /// Composition id submitted to the render service.
    pub fn composition_id(&self) -> &'static str {
        match self {
            TemplateType::Conversation => "conversation-lesson",
            TemplateType::VocabDrill => "vocab-drill",
            TemplateType::StoryTime => "story-time",
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Persisted output of a completed stage. Immutable once written; a stage
/// retry writes a new record that supersedes this one. Storage keys are
/// timestamp-qualified so superseded blobs are not silently lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub storage_key: String,
    pub url: String,
    pub duration_seconds: f64,
    pub size_bytes: i64,
    pub produced_at: DateTime<Utc>,
}

/// Reference to work running inside a vendor's own infrastructure.
/// Present only while a stage's external work is in flight; cleared once
/// the artifact hand-off completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalJobRef {
    pub provider: String,
    pub external_id: String,
}

/// Immutable client-supplied rendering preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSettings {
    pub aspect_ratio: String,
    pub resolution: String,
    pub captions_enabled: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            resolution: "720p".to_string(),
            captions_enabled: true,
        }
    }
}

/// One media-generation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoJob {
    pub id: Uuid,
    pub status: VideoStatus,
    pub template_type: TemplateType,

    /// Immutable input configuration supplied at creation.
    pub source_config: serde_json::Value,
    pub video_settings: VideoSettings,

    /// Structured lesson content produced upstream. Precondition for the
    /// render stage; read-only to this core.
    pub lesson_content: Option<serde_json::Value>,

    pub audio_output: Option<ArtifactRecord>,
    pub avatar_output: Option<ArtifactRecord>,
    pub final_output: Option<ArtifactRecord>,

    pub external_job: Option<ExternalJobRef>,

    pub error_message: Option<String>,
    pub error_step: Option<StageKind>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inputs for creating a job. Everything else starts empty.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewVideoJob {
    #[builder(default)]
    pub template_type: TemplateType,
    #[builder(default = serde_json::Value::Null)]
    pub source_config: serde_json::Value,
    #[builder(default)]
    pub video_settings: VideoSettings,
    #[builder(default, setter(strip_option))]
    pub lesson_content: Option<serde_json::Value>,
}

/// Targeted field patch. Every mutation of a job goes through one of
/// these so concurrent unrelated updates (a cancellation racing a poller's
/// artifact write) cannot clobber each other. `None` means "leave the
/// field alone"; `external_job: Some(None)` clears the reference.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<VideoStatus>,
    pub lesson_content: Option<serde_json::Value>,
    pub audio_output: Option<ArtifactRecord>,
    pub avatar_output: Option<ArtifactRecord>,
    pub final_output: Option<ArtifactRecord>,
    pub external_job: Option<Option<ExternalJobRef>>,
    pub error_message: Option<String>,
    pub error_step: Option<StageKind>,
}

impl JobPatch {
    pub fn status(status: VideoStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch recording a stage failure.
    pub fn failed(step: StageKind, message: String) -> Self {
        Self {
            status: Some(VideoStatus::Failed),
            error_message: Some(message),
            error_step: Some(step),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.lesson_content.is_none()
            && self.audio_output.is_none()
            && self.avatar_output.is_none()
            && self.final_output.is_none()
            && self.external_job.is_none()
            && self.error_message.is_none()
            && self.error_step.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_forward_only() {
        use VideoStatus::*;
        assert!(Pending.can_transition_to(AudioGenerating));
        assert!(AudioGenerating.can_transition_to(AvatarGenerating));
        assert!(AvatarGenerating.can_transition_to(Rendering));
        assert!(Rendering.can_transition_to(Completed));

        // No reverting.
        assert!(!AvatarGenerating.can_transition_to(AudioGenerating));
        assert!(!Completed.can_transition_to(Rendering));

        // Skipping forward is legal (audio done, render queued elsewhere).
        assert!(AudioGenerating.can_transition_to(Rendering));
    }

    #[test]
    fn failed_and_cancelled_reachable_from_any_non_terminal_state() {
        use VideoStatus::*;
        for status in [Pending, AudioGenerating, AvatarGenerating, Rendering] {
            assert!(status.can_transition_to(Failed));
            assert!(status.can_transition_to(Cancelled));
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(AudioGenerating));
    }

    #[test]
    fn rewriting_current_status_is_a_noop_transition() {
        assert!(VideoStatus::AudioGenerating.can_transition_to(VideoStatus::AudioGenerating));
        assert!(VideoStatus::Failed.can_transition_to(VideoStatus::Failed));
    }

    #[test]
    fn artifact_record_wire_shape_is_camel_case() {
        let artifact = ArtifactRecord {
            storage_key: "videos/a/audio/1.mp3".to_string(),
            url: "https://cdn.example.com/videos/a/audio/1.mp3".to_string(),
            duration_seconds: 12.5,
            size_bytes: 200_000,
            produced_at: Utc::now(),
        };
        let value = serde_json::to_value(&artifact).unwrap();
        assert!(value.get("storageKey").is_some());
        assert!(value.get("durationSeconds").is_some());
    }
}
