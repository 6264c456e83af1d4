// ServerKernel - core infrastructure with all dependencies
//
// Holds the pipeline (with its injected capabilities), the per-request
// speech-synthesizer registry, and shared infrastructure, and provides it
// to handlers via traits for testability.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;

use media_pipeline::{
    BaseSpeechSynthesizer, IngestionTracker, MediaPipeline, PipelineConfig, ProjectorConfig,
    RequestSpacer, RetryConfig, SpacingConfig, VideoJobStore,
};

use super::{CartesiaClient, ElevenLabsClient, HedraAdapter, RemotionClient, StorageClient};
use crate::config::Config;
use crate::store::PgVideoJobStore;

/// Speech synthesizers keyed by provider, with a default for requests
/// that name none.
pub struct SynthesizerRegistry {
    providers: HashMap<String, Arc<dyn BaseSpeechSynthesizer>>,
    default_provider: String,
}

impl SynthesizerRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(mut self, synth: Arc<dyn BaseSpeechSynthesizer>) -> Self {
        self.providers.insert(synth.provider().to_string(), synth);
        self
    }

    /// Resolve a provider name from the request, falling back to the
    /// default.
    pub fn resolve(&self, provider: Option<&str>) -> Option<Arc<dyn BaseSpeechSynthesizer>> {
        let key = provider.unwrap_or(&self.default_provider);
        self.providers.get(key).cloned()
    }
}

/// ServerKernel holds all server dependencies
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub pipeline: Arc<MediaPipeline>,
    pub synthesizers: SynthesizerRegistry,
    pub ingestion: Arc<IngestionTracker>,
    pub projector: ProjectorConfig,
}

impl ServerKernel {
    /// Creates a new ServerKernel with the given dependencies
    pub fn new(
        db_pool: PgPool,
        pipeline: Arc<MediaPipeline>,
        synthesizers: SynthesizerRegistry,
        ingestion: Arc<IngestionTracker>,
        projector: ProjectorConfig,
    ) -> Self {
        Self {
            db_pool,
            pipeline,
            synthesizers,
            ingestion,
            projector,
        }
    }

    /// Wire the production dependency graph from configuration.
    pub fn from_config(config: &Config, db_pool: PgPool) -> Result<Self> {
        let jobs: Arc<dyn VideoJobStore> = Arc::new(PgVideoJobStore::new(db_pool.clone()));
        let blobs = Arc::new(StorageClient::new(
            config.storage_url.clone(),
            config.storage_bucket.clone(),
            config.storage_service_key.clone(),
            config.storage_public_base_url.clone(),
        )?);
        let avatar = Arc::new(HedraAdapter::new(config.hedra_api_key.clone()));
        let render = Arc::new(RemotionClient::new(config.remotion_server_url.clone())?);

        let pipeline = Arc::new(MediaPipeline::new(
            jobs,
            blobs,
            avatar,
            render,
            Arc::new(RequestSpacer::new()),
            PipelineConfig {
                retry: RetryConfig::default(),
                spacing: SpacingConfig {
                    tts: Duration::from_millis(config.tts_min_interval_ms),
                    avatar: Duration::from_millis(config.avatar_min_interval_ms),
                    render: Duration::from_millis(config.render_min_interval_ms),
                },
                ..Default::default()
            },
        ));

        let mut synthesizers = SynthesizerRegistry::new("cartesia")
            .register(Arc::new(CartesiaClient::new(config.cartesia_api_key.clone())?));
        if let Some(key) = &config.elevenlabs_api_key {
            synthesizers = synthesizers.register(Arc::new(ElevenLabsClient::new(key.clone())?));
        }

        Ok(Self::new(
            db_pool,
            pipeline,
            synthesizers,
            Arc::new(IngestionTracker::new()),
            ProjectorConfig::default(),
        ))
    }
}
