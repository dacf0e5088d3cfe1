//! Health check endpoints

use axum::{extract::State, http::StatusCode};
use storefront_shared::with_deadline;

use crate::state::AppState;

/// Liveness check (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: the user store must answer within the deadline
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match with_deadline(state.config.db_timeout, state.users.ping()).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
