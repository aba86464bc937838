//! Liveness and status endpoints

use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use gateway_services::ServerStatus;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness))
        .route("/status", get(status))
}

async fn liveness() -> &'static str {
    "OK"
}

async fn status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(state.service.server_status())
}
