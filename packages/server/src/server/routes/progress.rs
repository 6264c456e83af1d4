//! SSE progress endpoints.
//!
//! One projector loop per connection samples the job's persisted progress
//! and pushes change-only events. The same projector serves media jobs
//! and research-ingestion jobs; only the progress source differs.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use media_pipeline::{spawn_projector, BaseProgressSource, ProgressEvent, VideoJobProgressSource};

use crate::server::app::AxumAppState;

/// GET /api/videos/:id/progress
pub async fn video_progress_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let source: Arc<dyn BaseProgressSource> = Arc::new(VideoJobProgressSource::new(
        state.kernel.pipeline.jobs().clone(),
    ));
    stream_progress(state, source, id)
}

/// GET /api/research/:id/progress
pub async fn research_progress_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let source: Arc<dyn BaseProgressSource> = state.kernel.ingestion.clone();
    stream_progress(state, source, id)
}

fn stream_progress(
    state: AxumAppState,
    source: Arc<dyn BaseProgressSource>,
    job_id: Uuid,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let rx = spawn_projector(source, job_id, state.kernel.projector);

    let events = ReceiverStream::new(rx).filter_map(|event: ProgressEvent| {
        Event::default()
            .event(event.kind)
            .json_data(&event)
            .ok()
            .map(Ok)
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
