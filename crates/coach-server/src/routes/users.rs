//! Profile and insight endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use coach_core::{PersonalizationProfile, ProfileUpdate, UserInsights};

use crate::error::ApiResult;
use crate::state::AppState;

/// Partially update a user's personalization profile.
/// PUT /users/:id/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<PersonalizationProfile>> {
    let profile = state.engine().update_profile(&user_id, update)?;
    Ok(Json(profile))
}

/// GET /users/:id/insights
pub async fn get_insights(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserInsights>> {
    let insights = state.engine().insights(&user_id)?;
    Ok(Json(insights))
}
