//! API route definitions

mod error;
mod exchanges;
mod health;
mod market;

use crate::AppState;
use axum::Router;

pub use error::ApiError;

/// Create the API router with all routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(market::routes())
        .merge(exchanges::routes())
        .merge(health::routes())
}
