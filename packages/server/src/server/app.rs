//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::kernel::ServerKernel;
use crate::server::routes::{
    cancel_video_handler, create_video_handler, get_video_handler, health_handler,
    poll_avatar_handler, poll_render_handler, research_progress_handler, start_audio_handler,
    start_avatar_handler, start_render_handler, video_progress_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub kernel: Arc<ServerKernel>,
}

/// Build the application router
pub fn build_app(kernel: Arc<ServerKernel>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/videos", post(create_video_handler))
        .route("/api/videos/:id", get(get_video_handler))
        .route("/api/videos/:id/cancel", post(cancel_video_handler))
        .route("/api/videos/:id/audio", post(start_audio_handler))
        .route("/api/videos/:id/avatar", post(start_avatar_handler))
        .route("/api/videos/:id/avatar/poll", get(poll_avatar_handler))
        .route("/api/videos/:id/render", post(start_render_handler))
        .route("/api/videos/render/:external_id", get(poll_render_handler))
        .route("/api/videos/:id/progress", get(video_progress_handler))
        .route("/api/research/:id/progress", get(research_progress_handler))
        .layer(Extension(AxumAppState { kernel }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
