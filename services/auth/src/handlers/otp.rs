use axum::{Json, extract::State};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::error::AuthServiceError;
use crate::state::AppState;
use crate::usecase::otp::{SendOtpInput, SendOtpUseCase, VerifyOtpInput, VerifyOtpUseCase};

#[derive(Serialize)]
pub struct OtpResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ── POST /otp/send ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendOtpRequest {
    pub identifier: String,
}

pub async fn send_otp(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<SendOtpRequest>, AuthServiceError>,
) -> Result<Json<OtpResponse>, AuthServiceError> {
    let usecase = SendOtpUseCase {
        otps: state.otp_repo(),
        dispatcher: state.dispatcher(),
        policy: state.otp_policy,
    };
    usecase
        .execute(SendOtpInput {
            identifier: body.identifier,
        })
        .await?;
    Ok(Json(OtpResponse {
        success: true,
        message: Some("code sent".to_owned()),
    }))
}

// ── POST /otp/verify ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub identifier: String,
    pub code: String,
}

pub async fn verify_otp(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<VerifyOtpRequest>, AuthServiceError>,
) -> Result<Json<OtpResponse>, AuthServiceError> {
    let usecase = VerifyOtpUseCase {
        otps: state.otp_repo(),
        policy: state.otp_policy,
    };
    usecase
        .execute(VerifyOtpInput {
            identifier: body.identifier,
            code: body.code,
        })
        .await?;
    Ok(Json(OtpResponse {
        success: true,
        message: None,
    }))
}
