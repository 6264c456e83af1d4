//! End-to-end pipeline scenarios against in-memory doubles.

use std::sync::Arc;

use serde_json::json;

use media_pipeline::testing::{
    AvatarCall, MemoryBlobStore, MemoryJobStore, MockAvatarGenerator, MockRenderService,
    MockSynthesizer,
};
use media_pipeline::{
    ArtifactRecord, AvatarGenerationStatus, AvatarStageRequest, BaseBlobStore, CharacterSource,
    ExternalJobState, JobPatch, MediaPipeline, NewVideoJob, PipelineConfig, PipelineError,
    ProviderError, RenderStart, RenderStatus, RequestSpacer, SpeechRequest, StageKind, StageStart,
    TemplateType, VideoJob, VideoJobStore, VideoStatus,
};

struct Harness {
    jobs: Arc<MemoryJobStore>,
    blobs: Arc<MemoryBlobStore>,
    avatar: Arc<MockAvatarGenerator>,
    render: Arc<MockRenderService>,
    pipeline: MediaPipeline,
}

fn harness_with(avatar: MockAvatarGenerator, render: MockRenderService) -> Harness {
    let jobs = Arc::new(MemoryJobStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let avatar = Arc::new(avatar);
    let render = Arc::new(render);
    let pipeline = MediaPipeline::new(
        jobs.clone(),
        blobs.clone(),
        avatar.clone(),
        render.clone(),
        Arc::new(RequestSpacer::new()),
        PipelineConfig::default(),
    );
    Harness {
        jobs,
        blobs,
        avatar,
        render,
        pipeline,
    }
}

fn harness() -> Harness {
    harness_with(MockAvatarGenerator::new(), MockRenderService::new())
}

fn speech_request() -> SpeechRequest {
    SpeechRequest {
        script: "Hola, bienvenidos a la lección tres.".to_string(),
        voice_id: "voice-ludwig".to_string(),
        speed: None,
        language: Some("es".to_string()),
    }
}

async fn create_job(h: &Harness) -> VideoJob {
    h.jobs
        .insert(
            NewVideoJob::builder()
                .template_type(TemplateType::Conversation)
                .lesson_content(json!({"title": "Greetings", "slides": ["hola"]}))
                .build(),
        )
        .await
        .unwrap()
}

/// Run audio + avatar start for a job, leaving it avatar_generating with
/// a live external reference.
async fn advance_to_avatar(h: &Harness, job: &VideoJob) -> String {
    let synth = MockSynthesizer::new();
    h.pipeline
        .start_audio(job.id, speech_request(), &synth)
        .await
        .unwrap();
    match h
        .pipeline
        .start_avatar(
            job.id,
            AvatarStageRequest {
                character: CharacterSource::Reference("char-9".to_string()),
                resolution: Some("720p".to_string()),
                aspect_ratio: None,
                text_prompt: None,
            },
        )
        .await
        .unwrap()
    {
        StageStart::Started { external_id } => external_id,
        other => panic!("expected Started, got {other:?}"),
    }
}

// ============================================================================
// Audio stage
// ============================================================================

#[tokio::test(start_paused = true)]
async fn audio_stage_retries_rate_limit_then_writes_artifact() {
    let h = harness();
    let job = create_job(&h).await;

    let synth = MockSynthesizer::new()
        .with_failure(ProviderError::http("mock-tts", 429, "rate limited"))
        .with_audio(vec![1u8; 32_000]);

    let artifact = h
        .pipeline
        .start_audio(job.id, speech_request(), &synth)
        .await
        .unwrap();

    // One rate-limit failure, one success.
    assert_eq!(synth.call_count(), 2);
    // 32,000 bytes at 128 kbps → 2 seconds.
    assert_eq!(artifact.duration_seconds, 2.0);
    assert!(artifact.storage_key.starts_with(&format!("videos/{}/audio/", job.id)));

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::AudioGenerating);
    assert_eq!(stored.audio_output.as_ref(), Some(&artifact));
    assert!(h.blobs.object(&artifact.storage_key).is_some());
}

#[tokio::test(start_paused = true)]
async fn audio_stage_permanent_error_fails_the_job() {
    let h = harness();
    let job = create_job(&h).await;

    let synth = MockSynthesizer::new()
        .with_failure(ProviderError::http("mock-tts", 400, "unknown voice id"));

    let err = h
        .pipeline
        .start_audio(job.id, speech_request(), &synth)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Provider(_)));
    // No retry on a permanent error.
    assert_eq!(synth.call_count(), 1);

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::Failed);
    assert_eq!(stored.error_step, Some(StageKind::AudioGeneration));
    assert!(stored.error_message.unwrap().contains("unknown voice id"));
}

#[tokio::test(start_paused = true)]
async fn audio_stage_exhausted_retries_surface_the_last_error() {
    let h = harness();
    let job = create_job(&h).await;

    let mut synth = MockSynthesizer::new();
    for _ in 0..4 {
        synth = synth.with_failure(ProviderError::http("mock-tts", 503, "overloaded"));
    }

    let err = h
        .pipeline
        .start_audio(job.id, speech_request(), &synth)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("overloaded"));
    // Initial attempt + three retries.
    assert_eq!(synth.call_count(), 4);
    assert_eq!(
        h.jobs.get(job.id).await.unwrap().status,
        VideoStatus::Failed
    );
}

// ============================================================================
// Avatar stage
// ============================================================================

#[tokio::test(start_paused = true)]
async fn avatar_stage_without_audio_fails_fast_with_no_vendor_call() {
    let h = harness();
    let job = create_job(&h).await;

    let err = h
        .pipeline
        .start_avatar(
            job.id,
            AvatarStageRequest {
                character: CharacterSource::Reference("char-9".to_string()),
                resolution: None,
                aspect_ratio: None,
                text_prompt: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Precondition {
            stage: StageKind::AvatarGeneration,
            missing: "audio_output",
        }
    ));
    // No call reached the vendor.
    assert_eq!(h.avatar.call_count(), 0);
    // Precondition errors do not fail the job.
    assert_eq!(
        h.jobs.get(job.id).await.unwrap().status,
        VideoStatus::Pending
    );
}

#[tokio::test(start_paused = true)]
async fn avatar_stage_uploads_audio_asset_and_stores_external_ref() {
    let h = harness();
    let job = create_job(&h).await;
    let external_id = advance_to_avatar(&h, &job).await;

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::AvatarGenerating);
    let external = stored.external_job.unwrap();
    assert_eq!(external.external_id, external_id);
    assert_eq!(external.provider, "mock-avatar");

    let calls = h.avatar.calls.lock().unwrap();
    assert!(matches!(&calls[0], AvatarCall::CreateAsset { kind, .. } if *kind == media_pipeline::AssetKind::Audio));
    assert!(matches!(&calls[1], AvatarCall::UploadAsset { size, .. } if *size > 0));
    assert!(matches!(&calls[2], AvatarCall::StartGeneration(req) if req.character_asset_id == "char-9"));
}

#[tokio::test(start_paused = true)]
async fn avatar_stage_uploads_character_image_when_given_by_url() {
    let h = harness();
    let job = create_job(&h).await;

    let synth = MockSynthesizer::new();
    h.pipeline
        .start_audio(job.id, speech_request(), &synth)
        .await
        .unwrap();

    h.blobs
        .seed_remote("https://cdn.example.com/tutor.png", vec![9u8; 512]);

    let started = h
        .pipeline
        .start_avatar(
            job.id,
            AvatarStageRequest {
                character: CharacterSource::ImageUrl(
                    "https://cdn.example.com/tutor.png".to_string(),
                ),
                resolution: None,
                aspect_ratio: None,
                text_prompt: None,
            },
        )
        .await
        .unwrap();
    assert!(matches!(started, StageStart::Started { .. }));

    // Audio asset + image asset each created and uploaded.
    let calls = h.avatar.calls.lock().unwrap();
    let creates = calls
        .iter()
        .filter(|c| matches!(c, AvatarCall::CreateAsset { .. }))
        .count();
    let uploads = calls
        .iter()
        .filter(|c| matches!(c, AvatarCall::UploadAsset { .. }))
        .count();
    assert_eq!(creates, 2);
    assert_eq!(uploads, 2);
}

#[tokio::test(start_paused = true)]
async fn duplicate_avatar_start_is_a_noop_returning_the_live_reference() {
    let h = harness();
    let job = create_job(&h).await;
    let external_id = advance_to_avatar(&h, &job).await;

    let second = h
        .pipeline
        .start_avatar(
            job.id,
            AvatarStageRequest {
                character: CharacterSource::Reference("char-9".to_string()),
                resolution: None,
                aspect_ratio: None,
                text_prompt: None,
            },
        )
        .await
        .unwrap();

    match second {
        StageStart::AlreadyRunning { external_id: id } => assert_eq!(id, external_id),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    // Exactly one generation was started.
    let starts = h
        .avatar
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, AvatarCall::StartGeneration(_)))
        .count();
    assert_eq!(starts, 1);
}

// ============================================================================
// Poller
// ============================================================================

#[tokio::test(start_paused = true)]
async fn poll_in_progress_reports_progress_without_mutating_status() {
    let h = harness();
    let job = create_job(&h).await;
    advance_to_avatar(&h, &job).await;

    let outcome = h.pipeline.poll_avatar(job.id).await.unwrap();
    assert_eq!(outcome.state, ExternalJobState::InProgress);
    assert_eq!(outcome.progress, Some(0.5));

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::AvatarGenerating);
    assert!(stored.external_job.is_some());
}

#[tokio::test(start_paused = true)]
async fn poll_complete_hands_off_and_is_idempotent() {
    let avatar = MockAvatarGenerator::new().with_status(AvatarGenerationStatus {
        state: ExternalJobState::Complete,
        progress: Some(1.0),
        output_url: Some("https://vendor.example.com/out/gen-1.mp4".to_string()),
        error: None,
    });
    let h = harness_with(avatar, MockRenderService::new());
    let job = create_job(&h).await;
    advance_to_avatar(&h, &job).await;

    h.blobs
        .seed_remote("https://vendor.example.com/out/gen-1.mp4", vec![7u8; 4_096]);

    let first = h.pipeline.poll_avatar(job.id).await.unwrap();
    assert_eq!(first.state, ExternalJobState::Complete);
    let artifact = first.artifact.clone().unwrap();
    assert_eq!(artifact.size_bytes, 4_096);

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.avatar_output.as_ref(), Some(&artifact));
    assert!(stored.external_job.is_none());

    // Second poll: cached result, no vendor call, no re-persist.
    let second = h.pipeline.poll_avatar(job.id).await.unwrap();
    assert_eq!(second.state, ExternalJobState::Complete);
    assert_eq!(second.artifact, first.artifact);
    assert_eq!(h.avatar.status_call_count(), 1);
    assert_eq!(
        h.blobs
            .remote_put_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn poll_failed_hand_off_surfaces_vendor_url_instead_of_failing_the_job() {
    let avatar = MockAvatarGenerator::new().with_status(AvatarGenerationStatus {
        state: ExternalJobState::Complete,
        progress: Some(1.0),
        output_url: Some("https://vendor.example.com/out/gen-1.mp4".to_string()),
        error: None,
    });
    let h = harness_with(avatar, MockRenderService::new());
    let job = create_job(&h).await;
    advance_to_avatar(&h, &job).await;

    h.blobs.fail_remote_puts();

    let outcome = h.pipeline.poll_avatar(job.id).await.unwrap();
    assert_eq!(outcome.state, ExternalJobState::Complete);
    assert!(outcome.artifact.is_none());
    assert_eq!(
        outcome.fallback_url.as_deref(),
        Some("https://vendor.example.com/out/gen-1.mp4")
    );
    assert!(outcome.warning.is_some());

    // The expensive generation is not thrown away: the job stays live so
    // a later poll can retry the hand-off.
    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::AvatarGenerating);
    assert!(stored.external_job.is_some());
}

#[tokio::test(start_paused = true)]
async fn poll_vendor_failure_fails_the_job_with_stage_and_message() {
    let avatar = MockAvatarGenerator::new().with_status(AvatarGenerationStatus {
        state: ExternalJobState::Failed,
        progress: None,
        output_url: None,
        error: Some("face detection failed".to_string()),
    });
    let h = harness_with(avatar, MockRenderService::new());
    let job = create_job(&h).await;
    advance_to_avatar(&h, &job).await;

    let outcome = h.pipeline.poll_avatar(job.id).await.unwrap();
    assert_eq!(outcome.state, ExternalJobState::Failed);

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::Failed);
    assert_eq!(stored.error_step, Some(StageKind::AvatarGeneration));
    assert!(stored.error_message.unwrap().contains("face detection failed"));
}

// ============================================================================
// Render stage
// ============================================================================

/// Complete the avatar stage by hand: persisted artifact, cleared
/// external reference, status still avatar_generating.
async fn advance_to_avatar_done(h: &Harness, job: &VideoJob) {
    advance_to_avatar(h, job).await;
    let key = format!("videos/{}/avatar/test.mp4", job.id);
    h.blobs.put(&key, vec![7u8; 2_048], "video/mp4").await.unwrap();
    h.jobs
        .patch(
            job.id,
            JobPatch {
                avatar_output: Some(ArtifactRecord {
                    storage_key: key.clone(),
                    url: format!("memory://public/{key}"),
                    duration_seconds: 9.5,
                    size_bytes: 2_048,
                    produced_at: chrono::Utc::now(),
                }),
                external_job: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn render_start_without_lesson_content_fails_fast() {
    let h = harness();
    let job = h
        .jobs
        .insert(NewVideoJob::builder().build())
        .await
        .unwrap();
    advance_to_avatar_done(&h, &job).await;

    let err = h.pipeline.start_render(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Precondition {
            stage: StageKind::Rendering,
            missing: "lesson_content",
        }
    ));
    assert_eq!(h.render.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn render_start_submits_composition_for_template() {
    let h = harness();
    let job = h
        .jobs
        .insert(
            NewVideoJob::builder()
                .template_type(TemplateType::VocabDrill)
                .lesson_content(json!({"words": ["hola", "adiós"]}))
                .build(),
        )
        .await
        .unwrap();
    advance_to_avatar_done(&h, &job).await;

    let started = h.pipeline.start_render(job.id).await.unwrap();
    match started {
        RenderStart::Started {
            composition_id, ..
        } => assert_eq!(composition_id, "vocab-drill"),
        other => panic!("expected Started, got {other:?}"),
    }

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::Rendering);
    assert!(stored.external_job.is_some());

    // Input props carry the publicly cached avatar URL, not a signed one.
    let calls = h.render.calls.lock().unwrap();
    let media_pipeline::testing::RenderCall::StartRender { input_props, .. } = &calls[0] else {
        panic!("expected StartRender call");
    };
    let url = input_props["avatarVideoUrl"].as_str().unwrap();
    assert!(url.starts_with("memory://public/"));
}

#[tokio::test(start_paused = true)]
async fn render_start_unconfigured_returns_input_props_without_advancing() {
    let h = harness_with(MockAvatarGenerator::new(), MockRenderService::unconfigured());
    let job = create_job(&h).await;
    advance_to_avatar_done(&h, &job).await;

    let outcome = h.pipeline.start_render(job.id).await.unwrap();
    match outcome {
        RenderStart::NotConfigured {
            composition_id,
            input_props,
        } => {
            assert_eq!(composition_id, "conversation-lesson");
            assert!(input_props.get("lessonContent").is_some());
            assert!(input_props.get("brandColors").is_some());
        }
        other => panic!("expected NotConfigured, got {other:?}"),
    }
    assert_eq!(
        h.jobs.get(job.id).await.unwrap().status,
        VideoStatus::AvatarGenerating
    );
}

#[tokio::test(start_paused = true)]
async fn render_poll_failure_records_out_of_memory() {
    let render = MockRenderService::new().with_status(RenderStatus {
        state: ExternalJobState::Failed,
        progress: None,
        output_url: None,
        file_size_bytes: None,
        duration_frames: None,
        fps: None,
        error: Some("out of memory".to_string()),
    });
    let h = harness_with(MockAvatarGenerator::new(), render);
    let job = create_job(&h).await;
    advance_to_avatar_done(&h, &job).await;

    let external_id = match h.pipeline.start_render(job.id).await.unwrap() {
        RenderStart::Started { external_id, .. } => external_id,
        other => panic!("expected Started, got {other:?}"),
    };

    let outcome = h.pipeline.poll_render(job.id, &external_id).await.unwrap();
    assert_eq!(outcome.state, ExternalJobState::Failed);

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::Failed);
    assert_eq!(stored.error_step, Some(StageKind::Rendering));
    assert!(stored.error_message.unwrap().contains("out of memory"));
}

#[tokio::test(start_paused = true)]
async fn render_poll_complete_finishes_the_job() {
    let render = MockRenderService::new().with_status(RenderStatus {
        state: ExternalJobState::Complete,
        progress: Some(1.0),
        output_url: Some("https://vendor.example.com/render/final.mp4".to_string()),
        file_size_bytes: Some(10_000_000),
        duration_frames: Some(300),
        fps: Some(30.0),
        error: None,
    });
    let h = harness_with(MockAvatarGenerator::new(), render);
    let job = create_job(&h).await;
    advance_to_avatar_done(&h, &job).await;
    h.blobs.seed_remote(
        "https://vendor.example.com/render/final.mp4",
        vec![1u8; 8_192],
    );

    let external_id = match h.pipeline.start_render(job.id).await.unwrap() {
        RenderStart::Started { external_id, .. } => external_id,
        other => panic!("expected Started, got {other:?}"),
    };

    let outcome = h.pipeline.poll_render(job.id, &external_id).await.unwrap();
    assert_eq!(outcome.state, ExternalJobState::Complete);
    let artifact = outcome.artifact.unwrap();
    // 300 frames at 30 fps.
    assert_eq!(artifact.duration_seconds, 10.0);

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, VideoStatus::Completed);
    assert!(stored.final_output.is_some());
    assert!(stored.external_job.is_none());
}

// ============================================================================
// Cancellation and state machine
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cancelled_job_refuses_all_stage_and_poller_entry_points() {
    let h = harness();
    let job = create_job(&h).await;
    advance_to_avatar(&h, &job).await;

    h.pipeline.cancel(job.id).await.unwrap();
    assert_eq!(
        h.jobs.get(job.id).await.unwrap().status,
        VideoStatus::Cancelled
    );

    let synth = MockSynthesizer::new();
    assert!(matches!(
        h.pipeline
            .start_audio(job.id, speech_request(), &synth)
            .await,
        Err(PipelineError::Cancelled { .. })
    ));
    assert!(matches!(
        h.pipeline.poll_avatar(job.id).await,
        Err(PipelineError::Cancelled { .. })
    ));
    assert!(matches!(
        h.pipeline.start_render(job.id).await,
        Err(PipelineError::Cancelled { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn cancel_is_a_noop_on_terminal_jobs() {
    let h = harness();
    let job = create_job(&h).await;
    h.jobs
        .patch(job.id, JobPatch::failed(StageKind::AudioGeneration, "boom".into()))
        .await
        .unwrap();

    let unchanged = h.pipeline.cancel(job.id).await.unwrap();
    assert_eq!(unchanged.status, VideoStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn store_rejects_backward_status_writes() {
    let h = harness();
    let job = create_job(&h).await;
    advance_to_avatar(&h, &job).await;

    let err = h
        .jobs
        .patch(job.id, JobPatch::status(VideoStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition { .. }));
}
