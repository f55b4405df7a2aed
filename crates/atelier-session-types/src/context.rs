//! Request-scoped session resolution.

use std::future::Future;

use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::request::Parts;

use atelier_core::error::AppError;
use atelier_domain::id::AccountId;

use crate::cookie::session_token;

/// The account behind a live session.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub account_id: AccountId,
    pub identifier: String,
    pub session_expires_at: DateTime<Utc>,
}

/// Resolves a raw session token to its owner. Implemented by the app state of any
/// service that guards routes with [`SessionContext`].
///
/// Lookup errors must be reported as `None`: a session that cannot be resolved is
/// treated as no session at all.
pub trait SessionResolver: Send + Sync {
    fn resolve_session(&self, token: &str) -> impl Future<Output = Option<SessionIdentity>> + Send;

    /// Where unauthenticated page navigations are sent.
    fn login_path(&self) -> &str;
}

/// Authenticated session for the current request, read from the `sessionToken` cookie.
///
/// Rejects with a redirect to the login path for browser navigations (`Accept: text/html`)
/// and with a 401 JSON body otherwise.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: String,
    pub identity: SessionIdentity,
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: SessionResolver,
{
    type Rejection = SessionRejection;

    // Extract header-derived values synchronously so the returned future only borrows
    // `state`, not `parts`.
    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let token = session_token(&CookieJar::from_headers(&parts.headers));
        let wants_html = accepts_html(&parts.headers);

        async move {
            let reject = || SessionRejection {
                login_path: state.login_path().to_owned(),
                wants_html,
            };
            let token = token.ok_or_else(reject)?;
            let identity = state.resolve_session(&token).await.ok_or_else(reject)?;
            Ok(Self { token, identity })
        }
    }
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"))
}

/// Returned when a request has no resolvable session.
#[derive(Debug)]
pub struct SessionRejection {
    pub login_path: String,
    pub wants_html: bool,
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        if self.wants_html {
            Redirect::to(&self.login_path).into_response()
        } else {
            AppError::Unauthorized.into_response()
        }
    }
}
