//! Profile endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::auth::{AuthUser, ProfileRepository, ProfileUpdate, UserProfile, AVATARS};
use crate::error::{AppError, Result};
use crate::ledger::{Balance, ToolType};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: UserProfile,
    pub credits: Balance,
}

#[derive(Debug, Serialize)]
pub struct AvatarsResponse {
    pub avatars: &'static [&'static str],
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).put(update_profile))
        .route("/avatars", get(list_avatars))
}

/// 404 tells the client to show onboarding
async fn get_profile(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserProfile>> {
    ProfileRepository::new(state.db())
        .get(&user.uid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>> {
    let profile = ProfileRepository::new(state.db()).upsert(&user.uid, &update).await?;
    // Opens the wallet with defaults if this is a new user.
    let credits = state.ledger().get_balance(&user.uid, ToolType::Compress).await?;

    tracing::info!(user_id = %user.uid, username = %profile.username, "Profile saved");
    Ok(Json(ProfileResponse { profile, credits }))
}

async fn list_avatars() -> Json<AvatarsResponse> {
    Json(AvatarsResponse { avatars: &AVATARS })
}
