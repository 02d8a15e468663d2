pub mod dto;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Cached portfolios
        .route("/portfolio", get(handlers::get_portfolio_by_query))
        .route("/api/v1/portfolio/{wallet}", get(handlers::get_portfolio))
        // On-demand refresh
        .route("/refresh", post(handlers::refresh))
}
