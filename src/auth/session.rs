use anyhow::anyhow;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::tokens::TokenPair;
use crate::{
    error::AppError,
    media::{self, TempUpload},
    state::AppState,
    users::{dto::PublicUser, repo_types::NewUser},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed, lowercased identifier; blank becomes `None`.
pub(crate) fn normalize_ident(v: Option<&str>) -> Option<String> {
    v.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}

pub struct RegisterInput {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<TempUpload>,
    pub cover_image: Option<TempUpload>,
}

pub struct LoginInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[instrument(skip_all, fields(username = %input.username))]
pub async fn register(st: &AppState, input: RegisterInput) -> Result<PublicUser, AppError> {
    let RegisterInput {
        full_name,
        email,
        username,
        password,
        avatar,
        cover_image,
    } = input;

    if [&full_name, &email, &username, &password]
        .iter()
        .any(|f| f.trim().is_empty())
    {
        return Err(AppError::Validation("All fields are required".into()));
    }
    let email = email.trim().to_lowercase();
    let username = username.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    if st
        .users
        .find_by_username_or_email(Some(&username), Some(&email))
        .await?
        .is_some()
    {
        warn!(%username, %email, "username or email already registered");
        return Err(AppError::Conflict(
            "User with this username or email already exists".into(),
        ));
    }

    let avatar = avatar.ok_or_else(|| AppError::Validation("Avatar file is required".into()))?;
    let avatar = media::upload(st.media.as_ref(), avatar).await.map_err(|e| {
        error!(error = ?e, "avatar upload failed");
        AppError::Upload("Avatar upload failed".into())
    })?;

    let cover = match cover_image {
        Some(file) => match media::upload(st.media.as_ref(), file).await {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = ?e, "cover image upload failed; continuing without it");
                None
            }
        },
        None => None,
    };

    let created = match st
        .users
        .create(NewUser {
            username,
            email,
            full_name: full_name.trim().to_string(),
            password,
            avatar_url: avatar.url.clone(),
            cover_image_url: cover.as_ref().map(|m| m.url.clone()),
        })
        .await
    {
        Ok(created) => created,
        Err(e) => {
            warn!(error = %e, "user insert failed; removing uploaded images");
            let mut orphans = vec![&avatar];
            orphans.extend(cover.as_ref());
            media::rollback(st.media.as_ref(), &orphans).await;
            return Err(e);
        }
    };

    let user = st
        .users
        .find_by_id(created.id)
        .await?
        .ok_or_else(|| anyhow!("user {} missing right after insert", created.id))?;

    info!(user_id = %user.id, "user registered");
    Ok(user.into())
}

#[instrument(skip_all)]
pub async fn login(st: &AppState, input: LoginInput) -> Result<LoginOutcome, AppError> {
    let username = normalize_ident(input.username.as_deref());
    let email = normalize_ident(input.email.as_deref());
    if username.is_none() && email.is_none() {
        return Err(AppError::Validation("Username or email is required".into()));
    }

    let user = st
        .users
        .find_by_username_or_email(username.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| {
            warn!(?username, ?email, "login for unknown user");
            AppError::NotFound("User not found".into())
        })?;

    if !user.verify_password(&input.password)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid password".into()));
    }

    let tokens = st.tokens.issue_pair(user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoginOutcome {
        user: user.into(),
        tokens,
    })
}

pub async fn logout(st: &AppState, user_id: Uuid) -> Result<(), AppError> {
    st.tokens.revoke(user_id).await
}

pub async fn refresh(st: &AppState, incoming: Option<&str>) -> Result<TokenPair, AppError> {
    st.tokens.rotate(incoming).await
}

#[instrument(skip(st, old_password, new_password))]
pub async fn change_password(
    st: &AppState,
    user_id: Uuid,
    old_password: &str,
    new_password: &str,
) -> Result<(), AppError> {
    let user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !user.verify_password(old_password)? {
        warn!(%user_id, "change_password with wrong old password");
        return Err(AppError::Validation("Old password is incorrect".into()));
    }
    if new_password.trim().is_empty() {
        return Err(AppError::Validation("New password is required".into()));
    }

    st.users.set_password(user.id, new_password).await?;
    info!(%user_id, "password changed");
    Ok(())
}

pub async fn current_user(st: &AppState, user_id: Uuid) -> Result<PublicUser, AppError> {
    st.users
        .find_by_id(user_id)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}
