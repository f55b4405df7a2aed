#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use atelier_domain::id::AccountId;
use atelier_domain::identifier::Identifier;

use crate::domain::types::{Account, OtpRecord, Session};
use crate::error::{AuthServiceError, DispatchError};

/// Keyed store of one-time codes. Every write is a single conditional statement so
/// concurrent sends and verifies for the same identifier cannot lose updates.
pub trait OtpRepository: Send + Sync {
    /// Insert or replace the record for `record.identifier` (last write wins).
    async fn upsert(&self, record: &OtpRecord) -> Result<(), AuthServiceError>;

    /// Like [`upsert`](Self::upsert), but keeps a pending, unexpired record issued after
    /// `issued_after` untouched. Returns `false` when the existing record was kept.
    async fn upsert_unless_recent(
        &self,
        record: &OtpRecord,
        issued_after: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError>;

    /// Current record for an identifier, in any state.
    async fn find(&self, identifier: &str) -> Result<Option<OtpRecord>, AuthServiceError>;

    /// Increment the failure counter of the record still holding `code`.
    /// Returns the new count, or `None` if the record was replaced or removed meanwhile.
    async fn record_failed_attempt(
        &self,
        identifier: &str,
        code: &str,
    ) -> Result<Option<i32>, AuthServiceError>;

    /// Mark the pending, unexpired record holding `code` as verified and move its expiry
    /// to `grant_expires_at`. Returns `false` if another request got there first.
    async fn mark_verified(
        &self,
        identifier: &str,
        code: &str,
        now: DateTime<Utc>,
        grant_expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError>;

    /// Remove and return a live verified record.
    async fn take_verified(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, AuthServiceError>;

    /// Delete the record only if it still holds `code`. Returns `true` if deleted.
    async fn delete(&self, identifier: &str, code: &str) -> Result<bool, AuthServiceError>;

    /// Delete every record that expired before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError>;
}

/// Account store shared with the storefront's profile features.
pub trait AccountRepository: Send + Sync {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, AuthServiceError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, AuthServiceError>;

    /// Insert unless an account with the same identifier already exists, then return the
    /// stored account. Two concurrent first sign-ins end up with the same account.
    async fn insert_or_get(&self, account: &Account) -> Result<Account, AuthServiceError>;
}

pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), AuthServiceError>;

    /// Unrevoked, unexpired session by token hash.
    async fn find_live(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthServiceError>;

    /// Revoke a session. Returns `true` if a live session was revoked.
    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AuthServiceError>;

    /// Delete expired and revoked sessions.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError>;
}

/// Outbound SMS / email channel. Success means the provider accepted the message for
/// delivery, not that it was delivered.
pub trait Dispatcher: Send + Sync {
    async fn send_message(&self, destination: &Identifier, body: &str)
    -> Result<(), DispatchError>;
}
