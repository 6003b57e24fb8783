use crate::state::AppState;
use axum::Router;

pub mod claims;
mod cookies;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::upload_routes(upload_limit))
}
