use axum::{http::StatusCode, Router};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::routes::{event_routes, site_routes, system_routes};
use crate::state::AppState;

/// Build the complete Axum application:
/// - /count, /message  (counter and guestbook)
/// - /events           (live updates over SSE)
/// - /static           (files from `static_dir`)
/// - /system           (alive, version, subscriber count)
///
/// Anything else answers 404.
pub fn build_app(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .merge(site_routes::routes(state.clone()))
        .merge(event_routes::routes(state.clone()))
        .nest("/system", system_routes::routes(state))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(not_found)

        // Logging middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 - Page Not Found")
}
