use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use tracing::instrument;

use super::{
    dto::{ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest},
    extractors::AuthUser,
    session::{self, LoginInput, RegisterInput},
    tokens::TokenPair,
};
use crate::{
    error::AppError, multipart::MultipartForm, response::ApiResponse, state::AppState,
    users::dto::PublicUser,
};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
const REFRESH_HEADER: &str = "x-refresh-token";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/register",
            post(register).layer(DefaultBodyLimit::max(20 * 1024 * 1024)),
        )
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh))
        .route("/users/logout", post(logout))
        .route("/users/change-password", post(change_password))
        .route("/users/current-user", get(current_user))
        .route("/users/get-current-user", post(current_user))
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn set_session(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, tokens.access_token.clone(), secure))
        .add(session_cookie(REFRESH_COOKIE, tokens.refresh_token.clone(), secure))
}

fn clear_session(jar: CookieJar, secure: bool) -> CookieJar {
    let expired = |name: &'static str| {
        let mut c = session_cookie(name, String::new(), secure);
        c.make_removal();
        c
    };
    jar.add(expired(ACCESS_COOKIE)).add(expired(REFRESH_COOKIE))
}

#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let mut form = MultipartForm::read(mp, &state.config.upload_tmp_dir).await?;
    let input = RegisterInput {
        full_name: form.text("fullName"),
        email: form.text("email"),
        username: form.text("username"),
        password: form.text("password"),
        avatar: form.take_file("avatar"),
        cover_image: form.take_file("coverImage"),
    };
    let user = session::register(&state, input).await?;
    Ok(ApiResponse::created(user, "User registered successfully"))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), AppError> {
    let outcome = session::login(
        &state,
        LoginInput {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        },
    )
    .await?;

    let jar = set_session(jar, &outcome.tokens, state.config.cookie_secure);
    Ok((
        jar,
        ApiResponse::ok(
            LoginResponse {
                user: outcome.user,
                access_token: outcome.tokens.access_token,
                refresh_token: outcome.tokens.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<serde_json::Value>), AppError> {
    session::logout(&state, user_id).await?;
    let jar = clear_session(jar, state.config.cookie_secure);
    Ok((jar, ApiResponse::ok(json!({}), "User logged out successfully")))
}

/// Refresh token is read from the cookie, then the JSON body, then the
/// `x-refresh-token` header (mobile clients). Empty values are skipped.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, ApiResponse<TokenPair>), AppError> {
    let present = |v: &String| !v.trim().is_empty();
    let incoming = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(present)
        .or_else(|| body.and_then(|Json(b)| b.refresh_token).filter(present))
        .or_else(|| {
            headers
                .get(REFRESH_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .filter(present)
        });

    let tokens = session::refresh(&state, incoming.as_deref()).await?;
    let jar = set_session(jar, &tokens, state.config.cookie_secure);
    Ok((jar, ApiResponse::ok(tokens, "Access token refreshed successfully")))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    session::change_password(&state, user_id, &payload.old_password, &payload.new_password).await?;
    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let user = session::current_user(&state, user_id).await?;
    Ok(ApiResponse::ok(user, "User fetched successfully"))
}
