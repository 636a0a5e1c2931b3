//! Mail transport seam — SMTP via lettre in production.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use super::message::OutboundEmail;
use crate::error::MailError;

/// Anything that can deliver an [`OutboundEmail`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

/// SMTP relay settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Returns `None` if `FEATUREWATCH_SMTP_HOST` is not set.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("FEATUREWATCH_SMTP_HOST").ok()?;

        let port: u16 = std::env::var("FEATUREWATCH_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("FEATUREWATCH_SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("FEATUREWATCH_SMTP_PASSWORD").unwrap_or_default();

        Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
        })
    }
}

/// Blocking lettre SMTP transport, driven from `spawn_blocking`.
pub struct SmtpMailTransport {
    transport: SmtpTransport,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| MailError::SendFailed(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let message = email.to_lettre()?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| MailError::SendFailed(format!("SMTP task panicked: {e}")))?
            .map_err(|e| MailError::SendFailed(format!("SMTP send failed: {e}")))?;

        tracing::info!(to = ?email.to, "Email sent");
        Ok(())
    }
}

/// Stand-in used when no SMTP relay is configured and sending is disabled.
/// Every send fails, so a misconfiguration can never look like a delivery.
pub struct UnconfiguredTransport;

#[async_trait]
impl MailTransport for UnconfiguredTransport {
    async fn send(&self, _email: &OutboundEmail) -> Result<(), MailError> {
        Err(MailError::SendFailed("no SMTP relay configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::mail::message::{EmailBody, sender_mailbox};

    #[test]
    fn smtp_config_from_env_returns_none_when_no_host() {
        // SAFETY: no other test reads FEATUREWATCH_SMTP_HOST.
        unsafe { std::env::remove_var("FEATUREWATCH_SMTP_HOST") };
        assert!(SmtpConfig::from_env().is_none());
    }

    #[tokio::test]
    async fn unconfigured_transport_always_fails() {
        let email = OutboundEmail::new(
            sender_mailbox(&MailConfig::default(), None).unwrap(),
            vec!["x@y.com".into()],
            "s",
            EmailBody::Text("b".into()),
        );
        assert!(UnconfiguredTransport.send(&email).await.is_err());
    }
}
