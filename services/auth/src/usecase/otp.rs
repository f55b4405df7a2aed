use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use tracing::{info, warn};

use atelier_domain::identifier::Identifier;

use crate::domain::repository::{Dispatcher, OtpRepository};
use crate::domain::types::{
    OTP_CODE_MAX, OTP_CODE_MIN, OtpPolicy, OtpRecord, VERIFIED_GRANT_TTL_SECS,
};
use crate::error::{AuthServiceError, DispatchError};

/// Uniformly random 6-digit code.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    rng.random_range(OTP_CODE_MIN..=OTP_CODE_MAX).to_string()
}

/// Text delivered by SMS and used as the email body.
pub fn otp_message(code: &str, ttl: Duration) -> String {
    format!(
        "Your Atelier verification code is {code}. It expires in {} minutes. \
         Never share this code with anyone.",
        ttl.num_minutes().max(1)
    )
}

// ── SendOtp ──────────────────────────────────────────────────────────────────

pub struct SendOtpInput {
    pub identifier: String,
}

#[derive(Debug)]
pub struct SendOtpOutput {
    pub identifier: Identifier,
    pub expires_at: DateTime<Utc>,
}

pub struct SendOtpUseCase<O, D>
where
    O: OtpRepository,
    D: Dispatcher,
{
    pub otps: O,
    pub dispatcher: D,
    pub policy: OtpPolicy,
}

impl<O, D> SendOtpUseCase<O, D>
where
    O: OtpRepository,
    D: Dispatcher,
{
    pub async fn execute(&self, input: SendOtpInput) -> Result<SendOtpOutput, AuthServiceError> {
        // 1. Validate before touching the store → 400
        let identifier = Identifier::parse(&input.identifier)?;
        let now = Utc::now();

        let record = OtpRecord {
            identifier: identifier.as_str().to_owned(),
            code: generate_code(),
            attempts: 0,
            created_at: now,
            expires_at: now + self.policy.ttl,
            verified_at: None,
        };

        // 2. Persist first so a verify racing the dispatch always finds the record.
        //    With a cooldown the write itself refuses to replace a recent code → 429.
        if self.policy.resend_cooldown > Duration::zero() {
            let issued_after = now - self.policy.resend_cooldown;
            if !self.otps.upsert_unless_recent(&record, issued_after).await? {
                let retry_after_secs = match self.otps.find(identifier.as_str()).await? {
                    Some(existing) => (existing.created_at - issued_after).num_seconds().max(1),
                    None => 1,
                };
                return Err(AuthServiceError::ResendCooldown { retry_after_secs });
            }
        } else {
            self.otps.upsert(&record).await?;
        }

        // 3. Dispatch, bounded by the policy timeout
        let body = otp_message(&record.code, self.policy.ttl);
        let dispatched = tokio::time::timeout(
            self.policy.dispatch_timeout,
            self.dispatcher.send_message(&identifier, &body),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout));

        // 4. Never leave a live code the user cannot have received
        if let Err(e) = dispatched {
            if let Err(cleanup) = self.otps.delete(&record.identifier, &record.code).await {
                warn!(
                    identifier = %identifier.masked(),
                    error = %cleanup,
                    "failed to roll back undelivered otp"
                );
            }
            return Err(AuthServiceError::DispatchFailure(e));
        }

        info!(
            identifier = %identifier.masked(),
            channel = identifier.kind().as_str(),
            "otp sent"
        );
        Ok(SendOtpOutput {
            identifier,
            expires_at: record.expires_at,
        })
    }
}

// ── VerifyOtp ────────────────────────────────────────────────────────────────

pub struct VerifyOtpInput {
    pub identifier: String,
    pub code: String,
}

#[derive(Debug)]
pub struct VerifyOtpOutput {
    pub identifier: Identifier,
    /// Deadline for exchanging the verification for a session.
    pub grant_expires_at: DateTime<Utc>,
}

pub struct VerifyOtpUseCase<O: OtpRepository> {
    pub otps: O,
    pub policy: OtpPolicy,
}

impl<O: OtpRepository> VerifyOtpUseCase<O> {
    pub async fn execute(
        &self,
        input: VerifyOtpInput,
    ) -> Result<VerifyOtpOutput, AuthServiceError> {
        let identifier = Identifier::parse(&input.identifier)?;
        let now = Utc::now();

        // A verified record is a pending grant, not a code: it never verifies twice.
        let record = self
            .otps
            .find(identifier.as_str())
            .await?
            .filter(|r| !r.is_verified())
            .ok_or(AuthServiceError::NotFoundOrExpired)?;

        if record.is_expired(now) {
            self.otps.delete(&record.identifier, &record.code).await?;
            return Err(AuthServiceError::OtpExpired);
        }

        if record.attempts >= self.policy.max_attempts {
            self.otps.delete(&record.identifier, &record.code).await?;
            return Err(AuthServiceError::TooManyAttempts);
        }

        if input.code != record.code {
            let attempts = self
                .otps
                .record_failed_attempt(&record.identifier, &record.code)
                .await?;
            if attempts.is_some_and(|n| n >= self.policy.max_attempts) {
                self.otps.delete(&record.identifier, &record.code).await?;
                warn!(identifier = %identifier.masked(), "otp attempts exhausted");
                return Err(AuthServiceError::TooManyAttempts);
            }
            return Err(AuthServiceError::CodeMismatch);
        }

        let grant_expires_at = now + Duration::seconds(VERIFIED_GRANT_TTL_SECS);
        let won = self
            .otps
            .mark_verified(&record.identifier, &record.code, now, grant_expires_at)
            .await?;
        if !won {
            return Err(AuthServiceError::NotFoundOrExpired);
        }

        info!(identifier = %identifier.masked(), "otp verified");
        Ok(VerifyOtpOutput {
            identifier,
            grant_expires_at,
        })
    }
}
