use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::report_routes()
}
