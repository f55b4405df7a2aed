use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::{CookieJar, WithRejection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_domain::id::AccountId;
use atelier_session_types::context::SessionContext;
use atelier_session_types::cookie::{clear_session_cookie, session_token, set_session_cookie};

use crate::error::AuthServiceError;
use crate::state::AppState;
use crate::usecase::session::{
    CreateSessionInput, CreateSessionUseCase, DestroySessionUseCase,
};

// ── POST /session/create ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub identifier: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_token: String,
    pub account_id: AccountId,
    #[serde(serialize_with = "atelier_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    WithRejection(Json(body), _): WithRejection<Json<CreateSessionRequest>, AuthServiceError>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let usecase = CreateSessionUseCase {
        otps: state.otp_repo(),
        accounts: state.account_repo(),
        sessions: state.session_repo(),
        account_policy: state.account_policy,
        session_ttl: state.session_ttl,
    };
    let out = usecase
        .execute(CreateSessionInput {
            identifier: body.identifier,
        })
        .await?;

    let jar = set_session_cookie(jar, out.token.clone(), &state.cookie_options(&headers));
    let body = CreateSessionResponse {
        success: true,
        session_token: out.token,
        account_id: out.account.id,
        expires_at: out.expires_at,
    };
    Ok((StatusCode::CREATED, jar, Json(body)))
}

// ── POST /session/destroy ─────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DestroySessionRequest {
    /// Falls back to the `sessionToken` cookie when omitted.
    pub session_token: Option<String>,
}

#[derive(Serialize)]
pub struct DestroySessionResponse {
    pub success: bool,
}

pub async fn destroy_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    // A sign-out form may post nothing but the cookie: no `Content-Type` means no body.
    WithRejection(body, _): WithRejection<Option<Json<DestroySessionRequest>>, AuthServiceError>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let token = body
        .session_token
        .filter(|t| !t.is_empty())
        .or_else(|| session_token(&jar));

    if let Some(token) = token {
        let usecase = DestroySessionUseCase {
            sessions: state.session_repo(),
        };
        usecase.execute(&token).await?;
    }

    let jar = clear_session_cookie(jar, &state.cookie_options(&headers));
    Ok((jar, Json(DestroySessionResponse { success: true })))
}

// ── GET /session ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentAccount {
    pub id: AccountId,
    pub identifier: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSessionResponse {
    pub success: bool,
    pub account: CurrentAccount,
    #[serde(serialize_with = "atelier_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
}

pub async fn current_session(ctx: SessionContext) -> Json<CurrentSessionResponse> {
    Json(CurrentSessionResponse {
        success: true,
        account: CurrentAccount {
            id: ctx.identity.account_id,
            identifier: ctx.identity.identifier,
        },
        expires_at: ctx.identity.session_expires_at,
    })
}
