use axum::http::HeaderMap;
use sea_orm::DatabaseConnection;
use tracing::error;

use atelier_session_types::context::{SessionIdentity, SessionResolver};
use atelier_session_types::cookie::CookieOptions;

use crate::domain::types::{AccountPolicy, OtpPolicy};
use crate::infra::db::{DbAccountRepository, DbOtpRepository, DbSessionRepository};
use crate::infra::dispatch::ChannelDispatcher;
use crate::usecase::session::ResolveSessionUseCase;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub dispatcher: ChannelDispatcher,
    pub otp_policy: OtpPolicy,
    pub account_policy: AccountPolicy,
    pub session_ttl: chrono::Duration,
    pub cookie_domain: Option<String>,
    /// Mark cookies `Secure` regardless of forwarded-proto headers.
    pub cookie_force_secure: bool,
    pub login_path: String,
}

impl AppState {
    pub fn otp_repo(&self) -> DbOtpRepository {
        DbOtpRepository {
            db: self.db.clone(),
        }
    }

    pub fn account_repo(&self) -> DbAccountRepository {
        DbAccountRepository {
            db: self.db.clone(),
        }
    }

    pub fn session_repo(&self) -> DbSessionRepository {
        DbSessionRepository {
            db: self.db.clone(),
        }
    }

    pub fn dispatcher(&self) -> ChannelDispatcher {
        self.dispatcher.clone()
    }

    pub fn cookie_options(&self, headers: &HeaderMap) -> CookieOptions {
        CookieOptions::for_request(headers, self.cookie_domain.clone(), self.cookie_force_secure)
    }
}

impl SessionResolver for AppState {
    async fn resolve_session(&self, token: &str) -> Option<SessionIdentity> {
        let usecase = ResolveSessionUseCase {
            accounts: self.account_repo(),
            sessions: self.session_repo(),
        };
        match usecase.execute(token).await {
            Ok(found) => found.map(|(session, account)| SessionIdentity {
                account_id: account.id,
                identifier: account.identifier,
                session_expires_at: session.expires_at,
            }),
            Err(e) => {
                error!(error = ?e, "session lookup failed");
                None
            }
        }
    }

    fn login_path(&self) -> &str {
        &self.login_path
    }
}
