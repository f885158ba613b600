pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod views;

use axum::{Router, routing::get};

use crate::state::AppState;

/// Router の構築
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/discord/success", get(handlers::discord_success_page))
        .route("/api/discord/success", get(handlers::discord_success_props))
        .with_state(state)
}
