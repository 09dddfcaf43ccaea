use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/alive", get(is_alive))
        .route("/version", get(version))
        .route("/subscribers", get(subscribers))
        .with_state(state)
}

/// GET /system/alive
async fn is_alive() -> &'static str {
    "OK"
}

/// GET /system/version
async fn version(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "version": state.server_version
    }))
}

/// GET /system/subscribers
async fn subscribers(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "subscribers": state.registry().len()
    }))
}
