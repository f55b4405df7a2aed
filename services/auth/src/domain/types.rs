use chrono::{DateTime, Duration, Utc};

use atelier_domain::id::AccountId;
use atelier_domain::identifier::{Identifier, IdentifierKind};

/// Latest one-time code issued to an identifier.
#[derive(Debug, Clone)]
pub struct OtpRecord {
    /// Normalized identifier (see [`Identifier`]); unique key.
    pub identifier: String,
    pub code: String,
    /// Failed verification attempts against this code.
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set once verified. A verified record is a single-use grant for session creation
    /// and never verifies again.
    pub verified_at: Option<DateTime<Utc>>,
}

impl OtpRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

/// Account that owns sessions.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub identifier: String,
    pub kind: IdentifierKind,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Fresh account for an identifier that has never signed in.
    pub fn provision(identifier: &Identifier, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            identifier: identifier.as_str().to_owned(),
            kind: identifier.kind(),
            name: None,
            created_at: now,
        }
    }
}

/// Server-side session record. Only the token hash is stored.
#[derive(Debug, Clone)]
pub struct Session {
    pub token_hash: String,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// What happens when a verified identifier has no account yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountPolicy {
    /// Create the account on first sign-in (implicit signup).
    AutoProvision,
    /// Only identifiers with an existing account may sign in.
    RequireExisting,
}

/// Tunables for issuing and verifying codes.
#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub ttl: Duration,
    pub max_attempts: i32,
    /// Minimum age of a pending code before another send is accepted. Zero disables.
    pub resend_cooldown: Duration,
    pub dispatch_timeout: std::time::Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(OTP_TTL_SECS),
            max_attempts: MAX_OTP_ATTEMPTS,
            resend_cooldown: Duration::zero(),
            dispatch_timeout: std::time::Duration::from_secs(DISPATCH_TIMEOUT_SECS),
        }
    }
}

/// Smallest and largest codes; every code has exactly 6 digits.
pub const OTP_CODE_MIN: u32 = 100_000;
pub const OTP_CODE_MAX: u32 = 999_999;

/// OTP time-to-live in seconds (5 minutes).
pub const OTP_TTL_SECS: i64 = 300;

/// Failed verifications allowed per code before a new one must be sent.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

/// How long a verified code may be exchanged for a session.
pub const VERIFIED_GRANT_TTL_SECS: i64 = 120;

/// Upper bound on a single dispatch call to the SMS gateway or SMTP relay.
pub const DISPATCH_TIMEOUT_SECS: u64 = 10;

/// Server-side session lifetime in seconds (30 days, same as the cookie Max-Age).
pub const SESSION_TTL_SECS: i64 = 2_592_000;

/// Random bytes per session token (256 bits).
pub const SESSION_TOKEN_BYTES: usize = 32;
