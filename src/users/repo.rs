use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUser, OwnerSummary, User, UserChanges, Video};
use crate::{auth::password, error::AppError};

/// Credential store: user records, password hashes and the live refresh token.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Exact match on the already-lowercased username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// First user matching either identifier; `None` identifiers never match.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError>;

    /// Inserts a user, hashing `new.password`.
    async fn create(&self, new: NewUser) -> Result<User, AppError>;

    async fn update_fields(&self, id: Uuid, changes: &UserChanges) -> Result<Option<User>, AppError>;

    /// Re-hashes and stores a password without touching any other column.
    async fn set_password(&self, id: Uuid, plain: &str) -> Result<(), AppError>;

    /// Unconditionally overwrites (or clears) the persisted refresh token.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError>;

    /// Replaces the refresh token only if it still equals `expected`.
    /// Returns `false` when another writer got there first.
    async fn swap_refresh_token(&self, id: Uuid, expected: &str, next: &str)
        -> Result<bool, AppError>;
}

/// Read side of the subscription and video relations.
#[async_trait]
pub trait GraphRepo: Send + Sync {
    async fn count_subscribers(&self, channel: Uuid) -> Result<i64, AppError>;
    async fn count_subscriptions(&self, subscriber: Uuid) -> Result<i64, AppError>;
    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, AppError>;
    /// Videos with the given ids, in no particular order.
    async fn find_videos(&self, ids: &[Uuid]) -> Result<Vec<Video>, AppError>;
    async fn find_owners(&self, ids: &[Uuid]) -> Result<Vec<OwnerSummary>, AppError>;
}

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, avatar_url, \
     cover_image_url, refresh_token, watch_history, created_at, updated_at";

fn map_unique(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict("User with this username or email already exists".into())
        }
        e => e.into(),
    }
}

#[derive(Clone)]
pub struct PgRepo {
    db: PgPool,
}

impl PgRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::text IS NOT NULL AND username = $1)
               OR ($2::text IS NOT NULL AND email = $2)
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, AppError> {
        let hash = password::hash_password(&new.password)?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, full_name, password_hash, avatar_url, cover_image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(&hash)
        .bind(&new.avatar_url)
        .bind(&new.cover_image_url)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)?;
        Ok(user)
    }

    async fn update_fields(&self, id: Uuid, changes: &UserChanges) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET full_name       = COALESCE($2, full_name),
                   email           = COALESCE($3, email),
                   username        = COALESCE($4, username),
                   avatar_url      = COALESCE($5, avatar_url),
                   cover_image_url = COALESCE($6, cover_image_url),
                   updated_at      = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.full_name)
        .bind(&changes.email)
        .bind(&changes.username)
        .bind(&changes.avatar_url)
        .bind(&changes.cover_image_url)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique)?;
        Ok(user)
    }

    async fn set_password(&self, id: Uuid, plain: &str) -> Result<(), AppError> {
        let hash = password::hash_password(plain)?;
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(&hash)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, updated_at = now()
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl GraphRepo for PgRepo {
    async fn count_subscribers(&self, channel: Uuid) -> Result<i64, AppError> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM subscriptions WHERE channel_id = $1",
        )
        .bind(channel)
        .fetch_one(&self.db)
        .await?;
        Ok(n)
    }

    async fn count_subscriptions(&self, subscriber: Uuid) -> Result<i64, AppError> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = $1",
        )
        .bind(subscriber)
        .fetch_one(&self.db)
        .await?;
        Ok(n)
    }

    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM subscriptions
                 WHERE subscriber_id = $1 AND channel_id = $2
            )
            "#,
        )
        .bind(subscriber)
        .bind(channel)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn find_videos(&self, ids: &[Uuid]) -> Result<Vec<Video>, AppError> {
        let rows = sqlx::query_as::<_, Video>(
            r#"
            SELECT id, owner_id, video_file, thumbnail, title, description,
                   duration, views, is_published, created_at
              FROM videos
             WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_owners(&self, ids: &[Uuid]) -> Result<Vec<OwnerSummary>, AppError> {
        let rows = sqlx::query_as::<_, OwnerSummary>(
            "SELECT id, full_name, username, avatar_url FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
