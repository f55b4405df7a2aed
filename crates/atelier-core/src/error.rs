use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

/// JSON failure envelope shared by every Atelier endpoint:
/// `{"success": false, "kind": "...", "message": "..."}`.
pub fn failure_body(kind: &str, message: &str) -> Value {
    json!({
        "success": false,
        "kind": kind,
        "message": message,
    })
}

/// Errors raised by the shared extractors before a service handler runs.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not authenticated")]
    Unauthorized,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = failure_body(self.kind(), &self.to_string());
        (self.status(), axum::Json(body)).into_response()
    }
}
