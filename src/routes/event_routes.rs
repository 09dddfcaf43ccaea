use axum::{
    extract::State,
    response::sse::{KeepAlive, Sse},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::services::event_stream::EventStream;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events))
        .with_state(state)
}

/// GET /events
///
/// The subscriber is registered here, before the first byte is sent, and
/// released when axum drops the body.
async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let stream = EventStream::open(&state);

    Sse::new(stream.into_sse())
        .keep_alive(KeepAlive::new().interval(state.streams.keep_alive))
}
