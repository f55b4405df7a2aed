use std::time::Duration;

use anyhow::Context as _;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Serialize;
use tracing::{info, warn};

use atelier_domain::identifier::{Identifier, IdentifierKind};

use crate::config::AuthConfig;
use crate::domain::repository::Dispatcher;
use crate::error::DispatchError;

const EMAIL_SUBJECT: &str = "Your Atelier sign-in code";

// ── SMS gateway ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SmsRequest<'a> {
    from: &'a str,
    to: &'a str,
    body: &'a str,
}

/// Generic HTTP SMS gateway: `POST {url}` with a JSON `{from, to, body}` payload and an
/// optional bearer token. Any 2xx counts as accepted.
#[derive(Clone)]
pub struct SmsGateway {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl SmsGateway {
    pub fn new(
        url: String,
        token: Option<String>,
        from: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build sms http client")?;
        Ok(Self {
            client,
            url,
            token,
            from,
        })
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), DispatchError> {
        let mut request = self.client.post(&self.url).json(&SmsRequest {
            from: &self.from,
            to,
            body,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout
            } else {
                DispatchError::Rejected(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected(format!("sms gateway returned {status}: {detail}")));
        }
        Ok(())
    }
}

// ── SMTP mailer ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("smtp relay {host}"))?
            .port(port)
            .timeout(Some(timeout));
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }
        let from = from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid SMTP_FROM address {from:?}"))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), DispatchError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| DispatchError::Rejected(format!("invalid recipient: {e}")))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(EMAIL_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())
            .map_err(|e| DispatchError::Rejected(format!("build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DispatchError::Rejected(e.to_string()))?;
        Ok(())
    }
}

// ── Channel routing ───────────────────────────────────────────────────────────

/// Routes a message to the channel matching the identifier kind.
#[derive(Clone, Default)]
pub struct ChannelDispatcher {
    pub sms: Option<SmsGateway>,
    pub email: Option<SmtpMailer>,
    /// Log messages instead of sending them.
    pub log_only: bool,
}

impl ChannelDispatcher {
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        if config.dispatch_log_only {
            warn!("DISPATCH_LOG_ONLY is set, one-time codes will be written to the log");
            return Ok(Self {
                log_only: true,
                ..Self::default()
            });
        }

        let timeout = Duration::from_secs(config.dispatch_timeout_secs);

        let sms = match (&config.sms_api_url, &config.sms_from) {
            (Some(url), Some(from)) => Some(SmsGateway::new(
                url.clone(),
                config.sms_api_token.clone(),
                from.clone(),
                timeout,
            )?),
            _ => None,
        };

        let email = match (&config.smtp_host, &config.smtp_from) {
            (Some(host), Some(from)) => {
                let credentials = config
                    .smtp_username
                    .clone()
                    .zip(config.smtp_password.clone());
                Some(SmtpMailer::new(host, config.smtp_port, credentials, from, timeout)?)
            }
            _ => None,
        };

        if sms.is_none() {
            warn!("sms channel not configured, phone sign-in is disabled");
        }
        if email.is_none() {
            warn!("email channel not configured, email sign-in is disabled");
        }

        Ok(Self {
            sms,
            email,
            log_only: false,
        })
    }
}

impl Dispatcher for ChannelDispatcher {
    async fn send_message(
        &self,
        destination: &Identifier,
        body: &str,
    ) -> Result<(), DispatchError> {
        if self.log_only {
            info!(to = destination.as_str(), body, "dispatch (log only)");
            return Ok(());
        }

        match destination.kind() {
            IdentifierKind::Phone => match &self.sms {
                Some(sms) => sms.send(destination.as_str(), body).await,
                None => Err(DispatchError::Unavailable(IdentifierKind::Phone)),
            },
            IdentifierKind::Email => match &self.email {
                Some(email) => email.send(destination.as_str(), body).await,
                None => Err(DispatchError::Unavailable(IdentifierKind::Email)),
            },
        }
    }
}
