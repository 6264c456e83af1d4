//! Server kernel: dependency container and vendor adapters.
//!
//! Each external capability gets a thin client module implementing the
//! corresponding `Base*` trait from the pipeline core, classifying its own
//! wire errors into retryable/permanent.

pub mod cartesia_client;
pub mod elevenlabs_client;
pub mod hedra;
pub mod remotion_client;
pub mod server_kernel;
pub mod storage_client;

pub use cartesia_client::CartesiaClient;
pub use elevenlabs_client::ElevenLabsClient;
pub use hedra::HedraAdapter;
pub use remotion_client::RemotionClient;
pub use server_kernel::{ServerKernel, SynthesizerRegistry};
pub use storage_client::StorageClient;

use media_pipeline::ProviderError;

/// Classify a reqwest transport failure. Timeouts and connection drops
/// are transient; everything else (TLS, malformed URL, decode) is
/// permanent.
pub(crate) fn classify_transport(provider: &str, err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() {
        ProviderError::transient(provider, err.to_string())
    } else {
        ProviderError::permanent(provider, err.to_string())
    }
}
