//! Bounce notices.
//!
//! The transport posts a form whose fields are prefixed `original-` (the
//! message that bounced) or `notification-` (the delivery failure report).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::message::{EmailBody, OutboundEmail, sender_mailbox};
use super::{Delivery, deliver};
use crate::config::MailConfig;
use crate::error::BounceError;
use crate::mail::transport::MailTransport;
use crate::store::Database;

const ORIGINAL_PREFIX: &str = "original-";
const NOTIFICATION_PREFIX: &str = "notification-";

/// A bounce notification, split into the bounced message and the report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BounceNotification {
    pub original: HashMap<String, String>,
    pub notification: HashMap<String, String>,
}

impl BounceNotification {
    /// Build from raw form fields. Unprefixed fields are ignored.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut bounce = Self::default();
        for (key, value) in fields {
            let key = key.as_ref();
            if let Some(name) = key.strip_prefix(ORIGINAL_PREFIX) {
                bounce.original.insert(name.to_string(), value.into());
            } else if let Some(name) = key.strip_prefix(NOTIFICATION_PREFIX) {
                bounce.notification.insert(name.to_string(), value.into());
            }
        }
        bounce
    }

    /// Field of the bounced message, e.g. `to` or `subject`.
    pub fn original(&self, key: &str) -> Option<&str> {
        self.original.get(key).map(String::as_str)
    }

    fn original_or_empty(&self, key: &str) -> &str {
        self.original(key).unwrap_or_default()
    }

    fn escalation_body(&self) -> String {
        format!(
            "The following message bounced.\n\
             =================\n\
             From: {}\n\
             To: {}\n\
             Subject: {}\n\
             \n\
             {}\n",
            self.original_or_empty("from"),
            self.original_or_empty("to"),
            self.original_or_empty("subject"),
            self.original_or_empty("text"),
        )
    }
}

/// Records bounces against the recipient's preferences and tells an operator.
pub struct BounceIngestor {
    config: Arc<MailConfig>,
    store: Arc<dyn Database>,
    transport: Arc<dyn MailTransport>,
}

impl BounceIngestor {
    pub fn new(
        config: Arc<MailConfig>,
        store: Arc<dyn Database>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
        }
    }

    pub async fn ingest(&self, bounce: &BounceNotification) -> Result<Delivery, BounceError> {
        let email_addr = bounce
            .original("to")
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .ok_or(BounceError::MissingRecipient)?;
        let subject = format!("Mail to '{email_addr}' bounced");
        info!(%subject, "Bounce received");

        let mut pref = self
            .store
            .get_prefs_for_emails(&[email_addr.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BounceError::NoPreference(email_addr.to_string()))?;
        pref.bounced = true;
        self.store.save_user_pref(&pref).await?;

        let body = bounce.escalation_body();
        info!(%body, "Escalating bounce");
        let sender = sender_mailbox(&self.config, None).map_err(BounceError::Escalation)?;
        let report = OutboundEmail::new(
            sender,
            vec![self.config.bounce_escalation_addr.clone()],
            subject,
            EmailBody::Text(body),
        );
        report
            .check_initialized()
            .map_err(BounceError::Escalation)?;

        deliver(&self.config, self.transport.as_ref(), &report)
            .await
            .map_err(|e| {
                warn!(error = %e, addr = email_addr, "Bounce recorded but escalation failed");
                BounceError::Escalation(e)
            })
    }
}
