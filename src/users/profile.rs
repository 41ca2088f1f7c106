use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{dto::PublicUser, repo_types::UserChanges};
use crate::{
    auth::session::{is_valid_email, normalize_ident},
    error::AppError,
    media::{self, TempUpload},
    state::AppState,
};

#[derive(Debug, Default)]
pub struct AccountDetails {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

#[instrument(skip(st, details))]
pub async fn update_account_details(
    st: &AppState,
    user_id: Uuid,
    details: AccountDetails,
) -> Result<PublicUser, AppError> {
    let changes = UserChanges {
        full_name: details
            .full_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        email: normalize_ident(details.email.as_deref()),
        username: normalize_ident(details.username.as_deref()),
        ..Default::default()
    };
    if changes.is_empty() {
        return Err(AppError::Validation(
            "At least one of fullName, email or username is required".into(),
        ));
    }
    if let Some(email) = &changes.email {
        if !is_valid_email(email) {
            return Err(AppError::Validation("Invalid email".into()));
        }
    }

    if changes.username.is_some() || changes.email.is_some() {
        let taken = st
            .users
            .find_by_username_or_email(changes.username.as_deref(), changes.email.as_deref())
            .await?
            .is_some_and(|other| other.id != user_id);
        if taken {
            return Err(AppError::Conflict(
                "User with this username or email already exists".into(),
            ));
        }
    }

    let user = st
        .users
        .update_fields(user_id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!(%user_id, "account details updated");
    Ok(user.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageSlot {
    Avatar,
    Cover,
}

impl ImageSlot {
    fn label(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "Avatar",
            ImageSlot::Cover => "Cover image",
        }
    }
}

pub async fn update_avatar(
    st: &AppState,
    user_id: Uuid,
    file: Option<TempUpload>,
) -> Result<PublicUser, AppError> {
    replace_image(st, user_id, file, ImageSlot::Avatar).await
}

pub async fn update_cover_image(
    st: &AppState,
    user_id: Uuid,
    file: Option<TempUpload>,
) -> Result<PublicUser, AppError> {
    replace_image(st, user_id, file, ImageSlot::Cover).await
}

/// Uploads the new image, points the user at it, then removes the old asset.
/// Removal is best-effort: the user already references the new URL. If the
/// user row cannot be updated the fresh upload is removed instead.
#[instrument(skip(st, file))]
async fn replace_image(
    st: &AppState,
    user_id: Uuid,
    file: Option<TempUpload>,
    slot: ImageSlot,
) -> Result<PublicUser, AppError> {
    let file = file.ok_or_else(|| AppError::Validation(format!("{} file is missing", slot.label())))?;

    let current = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let uploaded = media::upload(st.media.as_ref(), file).await.map_err(|e| {
        error!(error = ?e, ?slot, "image upload failed");
        AppError::Upload(format!("Error while uploading {}", slot.label().to_lowercase()))
    })?;

    let (old_url, changes) = match slot {
        ImageSlot::Avatar => (
            Some(current.avatar_url),
            UserChanges {
                avatar_url: Some(uploaded.url.clone()),
                ..Default::default()
            },
        ),
        ImageSlot::Cover => (
            current.cover_image_url,
            UserChanges {
                cover_image_url: Some(uploaded.url.clone()),
                ..Default::default()
            },
        ),
    };

    let updated = st
        .users
        .update_fields(user_id, &changes)
        .await
        .and_then(|u| u.ok_or_else(|| AppError::NotFound("User not found".into())));
    let user = match updated {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, ?slot, "image update not persisted; removing upload");
            media::rollback(st.media.as_ref(), &[&uploaded]).await;
            return Err(e);
        }
    };

    if let Some(old) = old_url.filter(|u| !u.is_empty()) {
        if let Err(e) = media::delete(st.media.as_ref(), &old).await {
            warn!(error = ?e, url = %old, ?slot, "failed to delete replaced image");
        }
    }

    info!(%user_id, ?slot, "image replaced");
    Ok(user.into())
}
