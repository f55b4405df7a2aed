use serde::Deserialize;

use atelier_core::config::Config;

use crate::domain::types::{
    AccountPolicy, DISPATCH_TIMEOUT_SECS, MAX_OTP_ATTEMPTS, OTP_TTL_SECS, OtpPolicy,
    SESSION_TTL_SECS,
};

/// Upper bound for any configured lifetime. Keeps `chrono::Duration` far from overflow.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Auth service configuration loaded from environment variables.
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port to listen on. Env var: `AUTH_PORT`.
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,
    /// Cookie domain attribute. Host-only cookie when unset.
    pub cookie_domain: Option<String>,
    /// Always mark the session cookie `Secure`, even without a forwarded-proto hint.
    #[serde(default)]
    pub cookie_secure: bool,
    /// Where unauthenticated browser navigations are redirected.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_otp_ttl_secs")]
    pub otp_ttl_secs: i64,
    #[serde(default = "default_otp_max_attempts")]
    pub otp_max_attempts: i32,
    /// Zero disables the cooldown.
    #[serde(default)]
    pub otp_resend_cooldown_secs: i64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    /// Create accounts on first sign-in. When false only existing accounts may sign in.
    #[serde(default = "default_true")]
    pub auto_provision_accounts: bool,

    /// Write codes to the log instead of sending them. Local development only.
    #[serde(default)]
    pub dispatch_log_only: bool,
    /// SMS gateway endpoint accepting `{from, to, body}` JSON.
    pub sms_api_url: Option<String>,
    pub sms_api_token: Option<String>,
    pub sms_from: Option<String>,
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,

    /// Interval of the expired-record sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Config for AuthConfig {}

impl AuthConfig {
    pub fn otp_policy(&self) -> OtpPolicy {
        OtpPolicy {
            ttl: chrono::Duration::seconds(self.otp_ttl_secs.clamp(1, MAX_TTL_SECS)),
            max_attempts: self.otp_max_attempts,
            resend_cooldown: chrono::Duration::seconds(
                self.otp_resend_cooldown_secs.clamp(0, MAX_TTL_SECS),
            ),
            dispatch_timeout: std::time::Duration::from_secs(self.dispatch_timeout_secs),
        }
    }

    pub fn account_policy(&self) -> AccountPolicy {
        if self.auto_provision_accounts {
            AccountPolicy::AutoProvision
        } else {
            AccountPolicy::RequireExisting
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs.clamp(1, MAX_TTL_SECS))
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_auth_port() -> u16 {
    3112
}

fn default_login_path() -> String {
    "/login".to_owned()
}

fn default_otp_ttl_secs() -> i64 {
    OTP_TTL_SECS
}

fn default_otp_max_attempts() -> i32 {
    MAX_OTP_ATTEMPTS
}

fn default_session_ttl_secs() -> i64 {
    SESSION_TTL_SECS
}

fn default_dispatch_timeout_secs() -> u64 {
    DISPATCH_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_smtp_port() -> u16 {
    587
}

fn default_sweep_interval_secs() -> u64 {
    600
}
