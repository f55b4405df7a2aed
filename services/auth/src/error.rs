use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};

use atelier_core::error::failure_body;
use atelier_domain::identifier::{IdentifierError, IdentifierKind};

/// Why an outbound message was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no {} channel configured", .0.as_str())]
    Unavailable(IdentifierKind),
    #[error("provider rejected message: {0}")]
    Rejected(String),
    #[error("provider timed out")]
    Timeout,
}

/// Auth service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),
    #[error("failed to send code")]
    DispatchFailure(#[source] DispatchError),
    #[error("not found/expired")]
    NotFoundOrExpired,
    #[error("expired")]
    OtpExpired,
    #[error("invalid code")]
    CodeMismatch,
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("code already sent, retry in {retry_after_secs}s")]
    ResendCooldown { retry_after_secs: i64 },
    #[error("identifier not verified")]
    NotVerified,
    #[error("account not found")]
    AccountNotFound,
    #[error("session creation failed")]
    SessionCreationFailure(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::DispatchFailure(_) => "DISPATCH_FAILURE",
            Self::NotFoundOrExpired => "NOT_FOUND_OR_EXPIRED",
            Self::OtpExpired => "OTP_EXPIRED",
            Self::CodeMismatch => "CODE_MISMATCH",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::ResendCooldown { .. } => "RESEND_COOLDOWN",
            Self::NotVerified => "NOT_VERIFIED",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::SessionCreationFailure(_) => "SESSION_CREATION_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            Self::DispatchFailure(_) => StatusCode::BAD_GATEWAY,
            Self::NotFoundOrExpired
            | Self::OtpExpired
            | Self::CodeMismatch
            | Self::NotVerified => StatusCode::UNAUTHORIZED,
            Self::TooManyAttempts | Self::ResendCooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::SessionCreationFailure(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Body extraction failures (missing `Content-Type`, malformed JSON, missing fields)
/// answer with the same envelope as every other failure.
impl From<JsonRejection> for AuthServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for AuthServiceError {
    fn into_response(self) -> Response {
        // tower-http TraceLayer already records method/uri/status; only failures on our
        // side carry a cause worth logging.
        match &self {
            Self::Internal(e) | Self::SessionCreationFailure(e) => {
                tracing::error!(error = ?e, kind = self.kind(), "internal error");
            }
            Self::DispatchFailure(e) => {
                tracing::warn!(error = %e, kind = self.kind(), "dispatch failure");
            }
            _ => {}
        }
        let body = failure_body(self.kind(), &self.to_string());
        let mut response = (self.status(), axum::Json(body)).into_response();
        if let Self::ResendCooldown { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
