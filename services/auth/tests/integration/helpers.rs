use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use atelier_auth::domain::repository::{
    AccountRepository, Dispatcher, OtpRepository, SessionRepository,
};
use atelier_auth::domain::types::{Account, AccountPolicy, OtpPolicy, OtpRecord, Session};
use atelier_auth::error::{AuthServiceError, DispatchError};
use atelier_auth::usecase::otp::{SendOtpUseCase, VerifyOtpUseCase};
use atelier_auth::usecase::session::{CreateSessionUseCase, ResolveSessionUseCase};
use atelier_domain::id::AccountId;
use atelier_domain::identifier::Identifier;

// ── MockOtpRepo ──────────────────────────────────────────────────────────────

/// In-memory OTP store. Clones share the same records.
#[derive(Clone, Default)]
pub struct MockOtpRepo {
    pub records: Arc<Mutex<HashMap<String, OtpRecord>>>,
}

impl MockOtpRepo {
    pub fn get(&self, identifier: &str) -> Option<OtpRecord> {
        self.records.lock().unwrap().get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Move the stored record's expiry into the past.
    pub fn expire(&self, identifier: &str) {
        if let Some(r) = self.records.lock().unwrap().get_mut(identifier) {
            r.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    /// Pretend the stored record was issued `age` ago.
    pub fn backdate(&self, identifier: &str, age: Duration) {
        if let Some(r) = self.records.lock().unwrap().get_mut(identifier) {
            r.created_at = r.created_at - age;
        }
    }
}

impl OtpRepository for MockOtpRepo {
    async fn upsert(&self, record: &OtpRecord) -> Result<(), AuthServiceError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.identifier.clone(), record.clone());
        Ok(())
    }

    async fn upsert_unless_recent(
        &self,
        record: &OtpRecord,
        issued_after: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        let recent = records.get(&record.identifier).is_some_and(|r| {
            r.verified_at.is_none()
                && r.expires_at >= record.created_at
                && r.created_at > issued_after
        });
        if recent {
            return Ok(false);
        }
        records.insert(record.identifier.clone(), record.clone());
        Ok(true)
    }

    async fn find(&self, identifier: &str) -> Result<Option<OtpRecord>, AuthServiceError> {
        Ok(self.get(identifier))
    }

    async fn record_failed_attempt(
        &self,
        identifier: &str,
        code: &str,
    ) -> Result<Option<i32>, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        Ok(records
            .get_mut(identifier)
            .filter(|r| r.code == code && r.verified_at.is_none())
            .map(|r| {
                r.attempts += 1;
                r.attempts
            }))
    }

    async fn mark_verified(
        &self,
        identifier: &str,
        code: &str,
        now: DateTime<Utc>,
        grant_expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(identifier) {
            Some(r) if r.code == code && r.verified_at.is_none() && r.expires_at >= now => {
                r.verified_at = Some(now);
                r.expires_at = grant_expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn take_verified(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        let live = records
            .get(identifier)
            .is_some_and(|r| r.verified_at.is_some() && r.expires_at >= now);
        Ok(if live { records.remove(identifier) } else { None })
    }

    async fn delete(&self, identifier: &str, code: &str) -> Result<bool, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        if records.get(identifier).is_some_and(|r| r.code == code) {
            records.remove(identifier);
            return Ok(true);
        }
        Ok(false)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.expires_at >= now);
        Ok((before - records.len()) as u64)
    }
}

// ── MockAccountRepo ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockAccountRepo {
    pub accounts: Arc<Mutex<Vec<Account>>>,
}

impl MockAccountRepo {
    pub fn len(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }
}

impl AccountRepository for MockAccountRepo {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, AuthServiceError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.identifier == identifier)
            .cloned())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, AuthServiceError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn insert_or_get(&self, account: &Account) -> Result<Account, AuthServiceError> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(existing) = accounts.iter().find(|a| a.identifier == account.identifier) {
            return Ok(existing.clone());
        }
        accounts.push(account.clone());
        Ok(account.clone())
    }
}

// ── MockSessionRepo ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockSessionRepo {
    pub sessions: Arc<Mutex<HashMap<String, Session>>>,
    /// Make `create` fail like a database outage.
    pub fail_create: bool,
    /// `find_live` returns the row whatever its state, like a lagging read replica.
    pub stale_reads: bool,
}

impl MockSessionRepo {
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn with_stale_reads() -> Self {
        Self {
            stale_reads: true,
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }
}

impl SessionRepository for MockSessionRepo {
    async fn create(&self, session: &Session) -> Result<(), AuthServiceError> {
        if self.fail_create {
            return Err(anyhow::anyhow!("connection reset by peer").into());
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_live(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthServiceError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .get(token_hash)
            .filter(|s| self.stale_reads || s.is_live(now))
            .cloned())
    }

    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(token_hash) {
            Some(s) if s.revoked_at.is_none() => {
                s.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live(now));
        Ok((before - sessions.len()) as u64)
    }
}

// ── MockDispatcher ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Default)]
pub enum DispatchMode {
    #[default]
    Accept,
    Reject,
    /// Never answers; only the use case timeout ends the call.
    Hang,
}

/// Records every message it is asked to send.
#[derive(Clone, Default)]
pub struct MockDispatcher {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub mode: DispatchMode,
}

impl MockDispatcher {
    pub fn with_mode(mode: DispatchMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Code contained in the latest message sent to `destination`.
    pub fn last_code_for(&self, destination: &str) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, body) = sent
            .iter()
            .rev()
            .find(|(to, _)| to == destination)
            .unwrap_or_else(|| panic!("no message sent to {destination}"));
        extract_code(body)
    }
}

impl Dispatcher for MockDispatcher {
    async fn send_message(
        &self,
        destination: &Identifier,
        body: &str,
    ) -> Result<(), DispatchError> {
        match self.mode {
            DispatchMode::Accept => {
                self.sent
                    .lock()
                    .unwrap()
                    .push((destination.as_str().to_owned(), body.to_owned()));
                Ok(())
            }
            DispatchMode::Reject => Err(DispatchError::Rejected("carrier refused".to_owned())),
            DispatchMode::Hang => {
                tokio::time::sleep(StdDuration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

fn extract_code(body: &str) -> String {
    body.split(|c: char| !c.is_ascii_digit())
        .find(|w| w.len() == 6)
        .unwrap_or_else(|| panic!("no 6-digit code in {body:?}"))
        .to_owned()
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// One in-memory backend shared by every use case, like a single database.
#[derive(Clone, Default)]
pub struct Harness {
    pub otps: MockOtpRepo,
    pub accounts: MockAccountRepo,
    pub sessions: MockSessionRepo,
    pub dispatcher: MockDispatcher,
    pub policy: OtpPolicy,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dispatch_mode(mode: DispatchMode) -> Self {
        Self {
            dispatcher: MockDispatcher::with_mode(mode),
            ..Self::default()
        }
    }

    pub fn send(&self) -> SendOtpUseCase<MockOtpRepo, MockDispatcher> {
        SendOtpUseCase {
            otps: self.otps.clone(),
            dispatcher: self.dispatcher.clone(),
            policy: self.policy,
        }
    }

    pub fn verify(&self) -> VerifyOtpUseCase<MockOtpRepo> {
        VerifyOtpUseCase {
            otps: self.otps.clone(),
            policy: self.policy,
        }
    }

    pub fn create_session(
        &self,
        account_policy: AccountPolicy,
    ) -> CreateSessionUseCase<MockOtpRepo, MockAccountRepo, MockSessionRepo> {
        CreateSessionUseCase {
            otps: self.otps.clone(),
            accounts: self.accounts.clone(),
            sessions: self.sessions.clone(),
            account_policy,
            session_ttl: Duration::days(30),
        }
    }

    pub fn resolve_session(&self) -> ResolveSessionUseCase<MockAccountRepo, MockSessionRepo> {
        ResolveSessionUseCase {
            accounts: self.accounts.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

pub fn test_account(identifier: &str) -> Account {
    let identifier = Identifier::parse(identifier).unwrap();
    Account::provision(&identifier, Utc::now() - Duration::days(90))
}
