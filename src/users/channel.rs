//! Channel profile and watch history, assembled as application-level joins
//! over the user, subscription and video relations.

use std::collections::HashMap;

use tracing::{debug, instrument};
use uuid::Uuid;

use super::dto::{ChannelProfile, VideoWithOwner};
use crate::{error::AppError, state::AppState};

#[instrument(skip(st))]
pub async fn get_channel_profile(
    st: &AppState,
    viewer: Option<Uuid>,
    username: &str,
) -> Result<ChannelProfile, AppError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(AppError::Validation("Invalid username".into()));
    }

    let channel = st
        .users
        .find_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound("Channel does not exist".into()))?;

    let subscribers_count = st.graph.count_subscribers(channel.id).await?;
    let subscribed_to_count = st.graph.count_subscriptions(channel.id).await?;
    let is_subscribed = match viewer {
        Some(viewer) => st.graph.is_subscribed(viewer, channel.id).await?,
        None => false,
    };

    Ok(ChannelProfile {
        full_name: channel.full_name,
        username: channel.username,
        email: channel.email,
        avatar_url: channel.avatar_url,
        cover_image_url: channel.cover_image_url,
        subscribers_count,
        subscribed_to_count,
        is_subscribed,
        created_at: channel.created_at,
    })
}

/// Videos from the user's watch history in stored order, each with a minimal
/// owner record. History entries whose video no longer exists are skipped.
#[instrument(skip(st))]
pub async fn get_watch_history(st: &AppState, user_id: Uuid) -> Result<Vec<VideoWithOwner>, AppError> {
    let user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if user.watch_history.is_empty() {
        return Ok(Vec::new());
    }

    let videos: HashMap<Uuid, _> = st
        .graph
        .find_videos(&user.watch_history)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();

    let mut owner_ids: Vec<Uuid> = videos.values().map(|v| v.owner_id).collect();
    owner_ids.sort_unstable();
    owner_ids.dedup();
    let owners: HashMap<Uuid, _> = st
        .graph
        .find_owners(&owner_ids)
        .await?
        .into_iter()
        .map(|o| (o.id, o))
        .collect();

    let history: Vec<VideoWithOwner> = user
        .watch_history
        .iter()
        .filter_map(|id| videos.get(id))
        .map(|v| VideoWithOwner::new(v.clone(), owners.get(&v.owner_id).cloned()))
        .collect();

    debug!(%user_id, entries = history.len(), "watch history resolved");
    Ok(history)
}
