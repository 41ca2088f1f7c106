use crate::state::AppState;
use axum::Router;

pub mod claims;
mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod session;
pub mod tokens;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
