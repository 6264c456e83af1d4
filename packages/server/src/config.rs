use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,

    // Speech synthesis
    pub cartesia_api_key: String,
    pub elevenlabs_api_key: Option<String>,

    // Avatar generation
    pub hedra_api_key: String,

    // Render farm. Unset means the render stage answers with the computed
    // input props instead of submitting.
    pub remotion_server_url: Option<String>,

    // Blob storage
    pub storage_url: String,
    pub storage_bucket: String,
    pub storage_service_key: String,
    pub storage_public_base_url: Option<String>,

    // Pipeline tunables (milliseconds)
    pub tts_min_interval_ms: u64,
    pub avatar_min_interval_ms: u64,
    pub render_min_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            cartesia_api_key: env::var("CARTESIA_API_KEY")
                .context("CARTESIA_API_KEY must be set")?,
            elevenlabs_api_key: env::var("ELEVENLABS_API_KEY").ok(),
            hedra_api_key: env::var("HEDRA_API_KEY").context("HEDRA_API_KEY must be set")?,
            remotion_server_url: env::var("REMOTION_SERVER_URL").ok(),
            storage_url: env::var("STORAGE_URL").context("STORAGE_URL must be set")?,
            storage_bucket: env::var("STORAGE_BUCKET").context("STORAGE_BUCKET must be set")?,
            storage_service_key: env::var("STORAGE_SERVICE_KEY")
                .context("STORAGE_SERVICE_KEY must be set")?,
            storage_public_base_url: env::var("STORAGE_PUBLIC_BASE_URL").ok(),
            tts_min_interval_ms: env_u64("TTS_MIN_INTERVAL_MS", 500)?,
            avatar_min_interval_ms: env_u64("AVATAR_MIN_INTERVAL_MS", 1_000)?,
            render_min_interval_ms: env_u64("RENDER_MIN_INTERVAL_MS", 1_000)?,
        })
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}
