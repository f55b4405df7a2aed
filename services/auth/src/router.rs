use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use atelier_core::health::healthz;
use atelier_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    health::readyz,
    otp::{send_otp, verify_otp},
    session::{create_session, current_session, destroy_session},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // OTP
        .route("/otp/send", post(send_otp))
        .route("/otp/verify", post(verify_otp))
        // Session
        .route("/session", get(current_session))
        .route("/session/create", post(create_session))
        .route("/session/destroy", post(destroy_session))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
