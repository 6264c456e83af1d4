//! Testing utilities including in-memory implementations.
//!
//! Useful for testing applications that use the pipeline without a
//! database or real vendor calls. Every double records its calls for
//! assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{BlobError, PipelineError, ProviderError, Result};
use crate::progress::{BaseProgressSource, ProgressSnapshot};
use crate::traits::{
    AssetKind, AvatarGenerationRequest, AvatarGenerationStatus, BaseAvatarGenerator,
    BaseBlobStore, BaseRenderService, BaseSpeechSynthesizer, ExternalJobState, RenderStatus,
    SpeechRequest, SynthesizedAudio, VideoJobStore,
};
use crate::types::job::{JobPatch, NewVideoJob, VideoJob, VideoStatus};

// =============================================================================
// In-memory job store
// =============================================================================

/// In-memory [`VideoJobStore`] with the same patch semantics as the
/// Postgres store: targeted field patches, forward-only status writes.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, VideoJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job in an arbitrary state, bypassing patch validation.
    pub fn put_job(&self, job: VideoJob) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }
}

#[async_trait]
impl VideoJobStore for MemoryJobStore {
    async fn get(&self, id: Uuid) -> Result<VideoJob> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(PipelineError::JobNotFound { job_id: id })
    }

    async fn insert(&self, new: NewVideoJob) -> Result<VideoJob> {
        let now = Utc::now();
        let job = VideoJob {
            id: Uuid::new_v4(),
            status: VideoStatus::Pending,
            template_type: new.template_type,
            source_config: new.source_config,
            video_settings: new.video_settings,
            lesson_content: new.lesson_content,
            audio_output: None,
            avatar_output: None,
            final_output: None,
            external_job: None,
            error_message: None,
            error_step: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn patch(&self, id: Uuid, patch: JobPatch) -> Result<VideoJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&id)
            .ok_or(PipelineError::JobNotFound { job_id: id })?;

        if let Some(next) = patch.status {
            if !job.status.can_transition_to(next) {
                return Err(PipelineError::InvalidTransition {
                    from: job.status,
                    to: next,
                });
            }
            job.status = next;
        }
        if let Some(content) = patch.lesson_content {
            job.lesson_content = Some(content);
        }
        if let Some(artifact) = patch.audio_output {
            job.audio_output = Some(artifact);
        }
        if let Some(artifact) = patch.avatar_output {
            job.avatar_output = Some(artifact);
        }
        if let Some(artifact) = patch.final_output {
            job.final_output = Some(artifact);
        }
        if let Some(external) = patch.external_job {
            job.external_job = external;
        }
        if let Some(message) = patch.error_message {
            job.error_message = Some(message);
        }
        if let Some(step) = patch.error_step {
            job.error_step = Some(step);
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

// =============================================================================
// In-memory blob store
// =============================================================================

/// In-memory [`BaseBlobStore`]. Signed URLs use a `memory://` scheme the
/// store itself can fetch; remote URLs are seeded with
/// [`MemoryBlobStore::seed_remote`].
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    remote: Mutex<HashMap<String, Vec<u8>>>,
    public_base: Option<String>,
    fail_remote_puts: AtomicBool,
    pub put_calls: AtomicU32,
    pub remote_put_calls: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            public_base: Some("memory://public".to_string()),
            ..Default::default()
        }
    }

    /// A store whose bucket exposes no public URLs (signed only).
    pub fn private() -> Self {
        Self::default()
    }

    /// Register bytes reachable at an external URL (vendor output,
    /// character images).
    pub fn seed_remote(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.remote.lock().unwrap().insert(url.into(), bytes);
    }

    /// Make subsequent `put_from_remote_url` calls fail, for hand-off
    /// degradation tests.
    pub fn fail_remote_puts(&self) {
        self.fail_remote_puts.store(true, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|(b, _)| b.clone())
    }
}

#[async_trait]
impl BaseBlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> std::result::Result<(), BlobError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_seconds: u64) -> std::result::Result<String, BlobError> {
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(BlobError::new("signed_url", format!("no such object: {key}")));
        }
        Ok(format!("memory://signed/{key}?ttl={ttl_seconds}"))
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base.as_ref().map(|base| format!("{base}/{key}"))
    }

    async fn put_from_remote_url(&self, key: &str, source_url: &str) -> std::result::Result<i64, BlobError> {
        self.remote_put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_remote_puts.load(Ordering::SeqCst) {
            return Err(BlobError::new("put_from_remote_url", "storage write refused"));
        }
        let bytes = self
            .remote
            .lock()
            .unwrap()
            .get(source_url)
            .cloned()
            .ok_or_else(|| {
                BlobError::new("put_from_remote_url", format!("unreachable source: {source_url}"))
            })?;
        let size = bytes.len() as i64;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, "video/mp4".to_string()));
        Ok(size)
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, BlobError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(rest) = url.strip_prefix("memory://signed/") {
            let key = rest.split('?').next().unwrap_or(rest);
            return self
                .object(key)
                .ok_or_else(|| BlobError::new("fetch", format!("no such object: {key}")));
        }
        if let Some(base) = &self.public_base {
            if let Some(key) = url.strip_prefix(&format!("{base}/")) {
                if let Some(bytes) = self.object(key) {
                    return Ok(bytes);
                }
            }
        }
        self.remote
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| BlobError::new("fetch", format!("unreachable url: {url}")))
    }
}

// =============================================================================
// Mock speech synthesizer
// =============================================================================

/// Scripted [`BaseSpeechSynthesizer`]. Responses are consumed in order;
/// once the script runs out, every call succeeds with default audio.
pub struct MockSynthesizer {
    responses: Mutex<VecDeque<std::result::Result<SynthesizedAudio, ProviderError>>>,
    pub calls: Mutex<Vec<SpeechRequest>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure(self, err: ProviderError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn with_audio(self, bytes: Vec<u8>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(SynthesizedAudio {
            bytes,
            content_type: "audio/mpeg".to_string(),
            duration_seconds: None,
        }));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSpeechSynthesizer for MockSynthesizer {
    fn provider(&self) -> &str {
        "mock-tts"
    }

    async fn synthesize(
        &self,
        req: &SpeechRequest,
    ) -> std::result::Result<SynthesizedAudio, ProviderError> {
        self.calls.lock().unwrap().push(req.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(SynthesizedAudio {
                bytes: vec![0u8; 16_000],
                content_type: "audio/mpeg".to_string(),
                duration_seconds: None,
            }),
        }
    }
}

// =============================================================================
// Mock avatar generator
// =============================================================================

#[derive(Debug, Clone)]
pub enum AvatarCall {
    CreateAsset { name: String, kind: AssetKind },
    UploadAsset { asset_id: String, size: usize },
    StartGeneration(AvatarGenerationRequest),
    GenerationStatus { external_id: String },
}

/// Scripted [`BaseAvatarGenerator`]. Status responses are consumed in
/// order; once exhausted, status reports in-progress.
pub struct MockAvatarGenerator {
    next_asset: AtomicU32,
    status_responses: Mutex<VecDeque<std::result::Result<AvatarGenerationStatus, ProviderError>>>,
    start_responses: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
    pub calls: Mutex<Vec<AvatarCall>>,
}

impl MockAvatarGenerator {
    pub fn new() -> Self {
        Self {
            next_asset: AtomicU32::new(1),
            status_responses: Mutex::new(VecDeque::new()),
            start_responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_status(self, status: AvatarGenerationStatus) -> Self {
        self.status_responses.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn with_start_failure(self, err: ProviderError) -> Self {
        self.start_responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn status_call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, AvatarCall::GenerationStatus { .. }))
            .count()
    }
}

impl Default for MockAvatarGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAvatarGenerator for MockAvatarGenerator {
    fn provider(&self) -> &str {
        "mock-avatar"
    }

    async fn create_asset(
        &self,
        name: &str,
        kind: AssetKind,
    ) -> std::result::Result<String, ProviderError> {
        self.calls.lock().unwrap().push(AvatarCall::CreateAsset {
            name: name.to_string(),
            kind,
        });
        let id = self.next_asset.fetch_add(1, Ordering::SeqCst);
        Ok(format!("asset-{id}"))
    }

    async fn upload_asset(
        &self,
        asset_id: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> std::result::Result<(), ProviderError> {
        self.calls.lock().unwrap().push(AvatarCall::UploadAsset {
            asset_id: asset_id.to_string(),
            size: bytes.len(),
        });
        Ok(())
    }

    async fn start_generation(
        &self,
        req: &AvatarGenerationRequest,
    ) -> std::result::Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(AvatarCall::StartGeneration(req.clone()));
        match self.start_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok("gen-1".to_string()),
        }
    }

    async fn generation_status(
        &self,
        external_id: &str,
    ) -> std::result::Result<AvatarGenerationStatus, ProviderError> {
        self.calls.lock().unwrap().push(AvatarCall::GenerationStatus {
            external_id: external_id.to_string(),
        });
        match self.status_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(AvatarGenerationStatus {
                state: ExternalJobState::InProgress,
                progress: Some(0.5),
                output_url: None,
                error: None,
            }),
        }
    }
}

// =============================================================================
// Mock render service
// =============================================================================

#[derive(Debug, Clone)]
pub enum RenderCall {
    StartRender {
        composition_id: String,
        input_props: serde_json::Value,
    },
    RenderStatus {
        external_id: String,
    },
}

/// Scripted [`BaseRenderService`].
pub struct MockRenderService {
    configured: bool,
    status_responses: Mutex<VecDeque<std::result::Result<RenderStatus, ProviderError>>>,
    pub calls: Mutex<Vec<RenderCall>>,
}

impl MockRenderService {
    pub fn new() -> Self {
        Self {
            configured: true,
            status_responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A render service with no endpoint configured.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_status(self, status: RenderStatus) -> Self {
        self.status_responses.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockRenderService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseRenderService for MockRenderService {
    fn provider(&self) -> &str {
        "mock-render"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn start_render(
        &self,
        composition_id: &str,
        input_props: &serde_json::Value,
    ) -> std::result::Result<String, ProviderError> {
        self.calls.lock().unwrap().push(RenderCall::StartRender {
            composition_id: composition_id.to_string(),
            input_props: input_props.clone(),
        });
        Ok("render-1".to_string())
    }

    async fn render_status(
        &self,
        external_id: &str,
    ) -> std::result::Result<RenderStatus, ProviderError> {
        self.calls.lock().unwrap().push(RenderCall::RenderStatus {
            external_id: external_id.to_string(),
        });
        match self.status_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(RenderStatus {
                state: ExternalJobState::InProgress,
                progress: Some(0.4),
                output_url: None,
                file_size_bytes: None,
                duration_frames: None,
                fps: None,
                error: None,
            }),
        }
    }
}

// =============================================================================
// Scripted progress source
// =============================================================================

/// Progress source that replays a fixed snapshot sequence. An exhausted,
/// non-repeating script samples as a not-found error.
pub struct ScriptedProgressSource {
    snapshots: Mutex<VecDeque<ProgressSnapshot>>,
    last: Mutex<Option<ProgressSnapshot>>,
    repeat_last: bool,
}

impl ScriptedProgressSource {
    pub fn new(snapshots: Vec<ProgressSnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            last: Mutex::new(None),
            repeat_last: false,
        }
    }

    /// Keep re-serving the final snapshot instead of erroring when the
    /// script runs out.
    pub fn repeating_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }
}

#[async_trait]
impl BaseProgressSource for ScriptedProgressSource {
    async fn sample(&self, job_id: Uuid) -> Result<ProgressSnapshot> {
        if let Some(snapshot) = self.snapshots.lock().unwrap().pop_front() {
            *self.last.lock().unwrap() = Some(snapshot.clone());
            return Ok(snapshot);
        }
        if self.repeat_last {
            if let Some(snapshot) = self.last.lock().unwrap().clone() {
                return Ok(snapshot);
            }
        }
        Err(PipelineError::JobNotFound { job_id })
    }
}
