use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use anyhow::anyhow;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo::{GraphRepo, UserRepo},
    repo_types::{NewUser, OwnerSummary, User, UserChanges, Video},
};
use crate::{auth::password, error::AppError};

/// In-process repository backing `AppState::fake()`.
#[derive(Default)]
pub struct MemoryRepo {
    users: Mutex<Vec<User>>,
    subscriptions: Mutex<Vec<(Uuid, Uuid)>>, // (subscriber, channel)
    videos: Mutex<Vec<Video>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    /// Number of user-table writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self, subscriber: Uuid, channel: Uuid) {
        self.subscriptions.lock().unwrap().push((subscriber, channel));
    }

    pub fn add_video(&self, owner_id: Uuid, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.videos.lock().unwrap().push(Video {
            id,
            owner_id,
            video_file: format!("https://media.test/upload/{id}.mp4"),
            thumbnail: format!("https://media.test/upload/{id}.jpg"),
            title: title.into(),
            description: String::new(),
            duration: 61.5,
            views: 0,
            is_published: true,
            created_at: OffsetDateTime::now_utc(),
        });
        id
    }

    pub fn push_history(&self, user_id: Uuid, video_id: Uuid) {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == user_id) {
            u.watch_history.push(video_id);
        }
    }

    /// Makes `create` and `update_fields` fail as if the database were down.
    pub fn set_fail_writes(&self, v: bool) {
        self.fail_writes.store(v, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("database unavailable").into());
        }
        Ok(())
    }

    fn touch(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserRepo for MemoryRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.user(id))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| {
                username.is_some_and(|n| u.username == n) || email.is_some_and(|e| u.email == e)
            })
            .cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, AppError> {
        self.check_writable()?;
        let password_hash = password::hash_password(&new.password)?;
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(AppError::Conflict(
                "User with this username or email already exists".into(),
            ));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            full_name: new.full_name,
            password_hash,
            avatar_url: new.avatar_url,
            cover_image_url: new.cover_image_url,
            refresh_token: None,
            watch_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        self.touch();
        Ok(user)
    }

    async fn update_fields(&self, id: Uuid, changes: &UserChanges) -> Result<Option<User>, AppError> {
        self.check_writable()?;
        let mut users = self.users.lock().unwrap();
        let clash = users.iter().any(|u| {
            u.id != id
                && (changes.username.as_ref() == Some(&u.username)
                    || changes.email.as_ref() == Some(&u.email))
        });
        if clash {
            return Err(AppError::Conflict(
                "User with this username or email already exists".into(),
            ));
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(v) = &changes.full_name {
            user.full_name = v.clone();
        }
        if let Some(v) = &changes.email {
            user.email = v.clone();
        }
        if let Some(v) = &changes.username {
            user.username = v.clone();
        }
        if let Some(v) = &changes.avatar_url {
            user.avatar_url = v.clone();
        }
        if let Some(v) = &changes.cover_image_url {
            user.cover_image_url = Some(v.clone());
        }
        user.updated_at = OffsetDateTime::now_utc();
        let updated = user.clone();
        drop(users);
        self.touch();
        Ok(Some(updated))
    }

    async fn set_password(&self, id: Uuid, plain: &str) -> Result<(), AppError> {
        let hash = password::hash_password(plain)?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        user.password_hash = hash;
        drop(users);
        self.touch();
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError> {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            u.refresh_token = token.map(str::to_owned);
        }
        self.touch();
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        let Some(u) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        if u.refresh_token.as_deref() != Some(expected) {
            return Ok(false);
        }
        u.refresh_token = Some(next.to_owned());
        drop(users);
        self.touch();
        Ok(true)
    }
}

#[async_trait]
impl GraphRepo for MemoryRepo {
    async fn count_subscribers(&self, channel: Uuid) -> Result<i64, AppError> {
        let subs = self.subscriptions.lock().unwrap();
        Ok(subs.iter().filter(|(_, c)| *c == channel).count() as i64)
    }

    async fn count_subscriptions(&self, subscriber: Uuid) -> Result<i64, AppError> {
        let subs = self.subscriptions.lock().unwrap();
        Ok(subs.iter().filter(|(s, _)| *s == subscriber).count() as i64)
    }

    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, AppError> {
        let subs = self.subscriptions.lock().unwrap();
        Ok(subs.iter().any(|&(s, c)| s == subscriber && c == channel))
    }

    async fn find_videos(&self, ids: &[Uuid]) -> Result<Vec<Video>, AppError> {
        // reversed so callers cannot rely on lookup order
        let videos = self.videos.lock().unwrap();
        Ok(videos
            .iter()
            .rev()
            .filter(|v| ids.contains(&v.id))
            .cloned()
            .collect())
    }

    async fn find_owners(&self, ids: &[Uuid]) -> Result<Vec<OwnerSummary>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(|u| OwnerSummary {
                id: u.id,
                full_name: u.full_name.clone(),
                username: u.username.clone(),
                avatar_url: u.avatar_url.clone(),
            })
            .collect())
    }
}
