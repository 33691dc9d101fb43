use axum::{extract::State, Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::UpdateId,
    services::EventOutcome,
    transport::ChatEvent,
};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub outcome: EventOutcome,
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Receives one chat update and runs it through the bot
pub async fn handle_event(
    State(state): State<AppState>,
    Extension(update_id): Extension<UpdateId>,
    Json(event): Json<ChatEvent>,
) -> AppResult<Json<EventResponse>> {
    tracing::info!(
        update_id = %update_id,
        user_id = %event.user_id(),
        kind = event.kind(),
        "Processing chat update"
    );

    let outcome = state.bot.handle_event(event).await?;

    tracing::info!(update_id = %update_id, outcome = ?outcome, "Chat update processed");

    Ok(Json(EventResponse { outcome }))
}
