use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::password, error::AppError};

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,              // lowercased, unique
    pub email: String,                 // lowercased, unique
    pub full_name: String,
    pub password_hash: String,         // argon2 PHC string, never serialized
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub refresh_token: Option<String>, // the single live refresh token
    pub watch_history: Vec<Uuid>,      // video ids in stored order
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn verify_password(&self, plain: &str) -> Result<bool, AppError> {
        Ok(password::verify_password(plain, &self.password_hash)?)
    }
}

/// Fields required to create a user. `password` is plaintext; the repository
/// hashes it on the way in.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_image_url: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.username.is_none()
            && self.avatar_url.is_none()
            && self.cover_image_url.is_none()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Video {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub created_at: OffsetDateTime,
}

/// Minimal owner projection attached to watch-history entries.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    #[serde(skip_serializing)]
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
    pub avatar_url: String,
}
