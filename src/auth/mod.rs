use axum::Router;

use crate::state::AppState;

pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
mod password;
pub mod repo;
mod repo_types;
mod services;
pub mod tokens;
mod wire;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::user_routes())
        .merge(handlers::token_routes())
        .merge(handlers::credential_routes())
}
