use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use atelier_domain::identifier::Identifier;

use crate::domain::repository::{AccountRepository, OtpRepository, SessionRepository};
use crate::domain::types::{Account, AccountPolicy, SESSION_TOKEN_BYTES, Session};
use crate::error::AuthServiceError;

/// Opaque session token: 256 bits from the thread-local CSPRNG, base64url without padding.
pub fn generate_session_token() -> String {
    let bytes: [u8; SESSION_TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Storage key for a token. The raw token is never persisted.
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ── CreateSession ────────────────────────────────────────────────────────────

pub struct CreateSessionInput {
    pub identifier: String,
}

#[derive(Debug)]
pub struct CreateSessionOutput {
    pub account: Account,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct CreateSessionUseCase<O, A, S>
where
    O: OtpRepository,
    A: AccountRepository,
    S: SessionRepository,
{
    pub otps: O,
    pub accounts: A,
    pub sessions: S,
    pub account_policy: AccountPolicy,
    pub session_ttl: Duration,
}

impl<O, A, S> CreateSessionUseCase<O, A, S>
where
    O: OtpRepository,
    A: AccountRepository,
    S: SessionRepository,
{
    pub async fn execute(
        &self,
        input: CreateSessionInput,
    ) -> Result<CreateSessionOutput, AuthServiceError> {
        let identifier = Identifier::parse(&input.identifier)?;
        let now = Utc::now();

        // 1. Consume the grant left by a successful verification → 401 if none.
        //    One grant, one session.
        self.otps
            .take_verified(identifier.as_str(), now)
            .await?
            .ok_or(AuthServiceError::NotVerified)?;

        // 2. Find or provision the account
        let account = match self.accounts.find_by_identifier(identifier.as_str()).await? {
            Some(account) => account,
            None => match self.account_policy {
                AccountPolicy::AutoProvision => {
                    let account = self
                        .accounts
                        .insert_or_get(&Account::provision(&identifier, now))
                        .await?;
                    info!(
                        account_id = %account.id,
                        identifier = %identifier.masked(),
                        "account provisioned"
                    );
                    account
                }
                AccountPolicy::RequireExisting => return Err(AuthServiceError::AccountNotFound),
            },
        };

        // 3. Mint and persist the session
        let token = generate_session_token();
        let session = Session {
            token_hash: hash_session_token(&token),
            account_id: account.id,
            created_at: now,
            expires_at: now + self.session_ttl,
            revoked_at: None,
        };
        self.sessions
            .create(&session)
            .await
            .map_err(|e| match e {
                AuthServiceError::Internal(cause) => AuthServiceError::SessionCreationFailure(cause),
                other => other,
            })?;

        info!(account_id = %account.id, "session created");
        Ok(CreateSessionOutput {
            account,
            token,
            expires_at: session.expires_at,
        })
    }
}

// ── ResolveSession ───────────────────────────────────────────────────────────

pub struct ResolveSessionUseCase<A: AccountRepository, S: SessionRepository> {
    pub accounts: A,
    pub sessions: S,
}

impl<A: AccountRepository, S: SessionRepository> ResolveSessionUseCase<A, S> {
    /// Live session and its owner, or `None` for unknown, expired or revoked tokens.
    pub async fn execute(
        &self,
        token: &str,
    ) -> Result<Option<(Session, Account)>, AuthServiceError> {
        if token.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        // The store filters too; the check here holds even if a read is stale.
        let Some(session) = self
            .sessions
            .find_live(&hash_session_token(token), now)
            .await?
            .filter(|s| s.is_live(now))
        else {
            return Ok(None);
        };

        match self.accounts.find_by_id(session.account_id).await? {
            Some(account) => Ok(Some((session, account))),
            None => {
                warn!(account_id = %session.account_id, "live session without account");
                Ok(None)
            }
        }
    }
}

// ── DestroySession ───────────────────────────────────────────────────────────

pub struct DestroySessionUseCase<S: SessionRepository> {
    pub sessions: S,
}

impl<S: SessionRepository> DestroySessionUseCase<S> {
    /// Revoke the session server-side. Idempotent: unknown or already revoked tokens
    /// return `Ok(false)`.
    pub async fn execute(&self, token: &str) -> Result<bool, AuthServiceError> {
        if token.is_empty() {
            return Ok(false);
        }
        let revoked = self
            .sessions
            .revoke(&hash_session_token(token), Utc::now())
            .await?;
        if revoked {
            info!("session revoked");
        }
        Ok(revoked)
    }
}

// ── PurgeExpired ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeOutput {
    pub otp_records: u64,
    pub sessions: u64,
}

pub struct PurgeExpiredUseCase<O: OtpRepository, S: SessionRepository> {
    pub otps: O,
    pub sessions: S,
}

impl<O: OtpRepository, S: SessionRepository> PurgeExpiredUseCase<O, S> {
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<PurgeOutput, AuthServiceError> {
        Ok(PurgeOutput {
            otp_records: self.otps.purge_expired(now).await?,
            sessions: self.sessions.purge_expired(now).await?,
        })
    }
}
