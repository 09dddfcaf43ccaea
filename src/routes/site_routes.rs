use axum::{
    extract::State,
    routing::get,
    Form, Router,
};
use serde::Deserialize;

use crate::errors::SiteError;
use crate::services::site_service;
use crate::state::AppState;

/// Build the counter and guestbook routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/count", get(get_count).post(post_count))
        .route("/message", get(get_message).post(post_message))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    #[serde(default)]
    pub message: String,
}

//
// ─────────────────────────────────────────────────────────────
// GET /count
// Current visit count
// ─────────────────────────────────────────────────────────────
//
async fn get_count(State(state): State<AppState>) -> String {
    site_service::read_count(&state).to_string()
}

//
// ─────────────────────────────────────────────────────────────
// POST /count
// Increment, persist and broadcast
// ─────────────────────────────────────────────────────────────
//
async fn post_count(State(state): State<AppState>) -> Result<String, SiteError> {
    let count = site_service::increment_count(&state)?;
    Ok(format!("Count is now: {count}"))
}

//
// ─────────────────────────────────────────────────────────────
// GET /message
// Rendered last message, empty if none
// ─────────────────────────────────────────────────────────────
//
async fn get_message(State(state): State<AppState>) -> String {
    site_service::read_last_message(&state)
}

//
// ─────────────────────────────────────────────────────────────
// POST /message
// Replace the guestbook message; a missing field posts ""
// ─────────────────────────────────────────────────────────────
//
async fn post_message(
    State(state): State<AppState>,
    form: Option<Form<MessageForm>>,
) -> Result<String, SiteError> {
    let text = form.map(|Form(f)| f.message).unwrap_or_default();
    let stored = site_service::post_message(&state, text)?;
    Ok(format!("Message received: {}", stored.text))
}
