use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    channel,
    dto::{ChannelProfile, PublicUser, UpdateAccountRequest, VideoWithOwner},
    profile::{self, AccountDetails},
};
use crate::{
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::AppError,
    multipart::MultipartForm,
    response::ApiResponse,
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/update-account", patch(update_account))
        .route("/users/update-account-details", patch(update_account))
        .route("/users/avatar", patch(update_avatar))
        .route("/users/update-user-avatar", post(update_avatar))
        .route("/users/cover-image", patch(update_cover_image))
        .route("/users/update-user-cover-image", post(update_cover_image))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

pub fn channel_routes() -> Router<AppState> {
    Router::new()
        .route("/users/c/:username", get(channel_profile))
        .route("/users/history", get(watch_history))
        .route("/users/getWatchHistory", get(watch_history))
}

#[instrument(skip(state, payload))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let details = AccountDetails {
        full_name: payload.full_name,
        email: payload.email,
        username: payload.username,
    };
    let user = profile::update_account_details(&state, user_id, details).await?;
    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

#[instrument(skip(state, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let mut form = MultipartForm::read(mp, &state.config.upload_tmp_dir).await?;
    let user = profile::update_avatar(&state, user_id, form.take_file("avatar")).await?;
    Ok(ApiResponse::ok(user, "Avatar updated successfully"))
}

#[instrument(skip(state, mp))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let mut form = MultipartForm::read(mp, &state.config.upload_tmp_dir).await?;
    let user = profile::update_cover_image(&state, user_id, form.take_file("coverImage")).await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully"))
}

#[instrument(skip(state))]
pub async fn channel_profile(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>, AppError> {
    let profile = channel::get_channel_profile(&state, viewer, &username).await?;
    Ok(ApiResponse::ok(profile, "Channel profile fetched successfully"))
}

#[instrument(skip(state))]
pub async fn watch_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<ApiResponse<Vec<VideoWithOwner>>, AppError> {
    let history = channel::get_watch_history(&state, user_id).await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}
