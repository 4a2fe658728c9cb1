//! Message generation, listing and interaction endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use coach_core::types::Page;
use coach_core::{CoachingMessage, GenerationOutcome, InteractionType, ListMessages};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Run one generation cycle for a user.
/// POST /users/:id/messages/generate
pub async fn generate_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<GenerationOutcome>> {
    let outcome = state.engine().generate_for_user(&user_id).await?;
    Ok(Json(outcome))
}

/// List a user's messages, newest first.
/// GET /users/:id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListMessages>,
) -> ApiResult<Json<Page<CoachingMessage>>> {
    let page = state.engine().list_messages(&user_id, &query)?;
    Ok(Json(page))
}

/// Record a read, act, dismiss or snooze on a delivered message.
/// POST /messages/:id/interactions
pub async fn record_interaction(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Json(interaction): Json<InteractionType>,
) -> ApiResult<Json<CoachingMessage>> {
    let id = Uuid::parse_str(&message_id)
        .map_err(|_| ApiError::validation(format!("Invalid message id: {}", message_id)))?;
    let message = state.engine().record_interaction(id, interaction)?;
    Ok(Json(message))
}
