mod channel;
pub mod dto;
pub mod handlers;
#[cfg(test)]
pub mod memory;
mod profile;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::profile_routes())
        .merge(handlers::channel_routes())
}
