use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::state::AppState;

/// Handler for `GET /readyz`: 200 once the database answers, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    match state.db.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
