//! Transport-ready outbound email.
//!
//! `OutboundEmail` is built and validated before any transport sees it, so
//! the audit log and the tests can inspect exactly what would be sent.

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Address;

use crate::config::MailConfig;
use crate::error::MailError;

/// Email body, HTML for notifications and plain text for operator reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBody {
    Html(String),
    Text(String),
}

impl EmailBody {
    pub fn as_str(&self) -> &str {
        match self {
            EmailBody::Html(s) | EmailBody::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub sender: Mailbox,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: EmailBody,
    pub reply_to: Option<String>,
    /// Written to both `References` and `In-Reply-To`.
    pub references: Option<String>,
}

impl OutboundEmail {
    pub fn new(
        sender: Mailbox,
        to: Vec<String>,
        subject: impl Into<String>,
        body: EmailBody,
    ) -> Self {
        Self {
            sender,
            to,
            cc: Vec::new(),
            subject: subject.into(),
            body,
            reply_to: None,
            references: None,
        }
    }

    pub fn with_cc(mut self, cc: Vec<String>) -> Self {
        self.cc = cc;
        self
    }

    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    pub fn with_references(mut self, references: Option<String>) -> Self {
        self.references = references;
        self
    }

    /// Reject messages the transport would refuse anyway.
    pub fn check_initialized(&self) -> Result<(), MailError> {
        if self.sender.email.to_string().is_empty() {
            return Err(MailError::Incomplete("sender"));
        }
        if self.to.iter().all(|addr| addr.trim().is_empty()) {
            return Err(MailError::Incomplete("to"));
        }
        if self.subject.trim().is_empty() {
            return Err(MailError::Incomplete("subject"));
        }
        if self.body.as_str().is_empty() {
            return Err(MailError::Incomplete("body"));
        }
        Ok(())
    }

    /// Body truncated to at most `max_chars` characters, for logging.
    pub fn body_preview(&self, max_chars: usize) -> String {
        self.body.as_str().chars().take(max_chars).collect()
    }

    /// Write every field to the log before transmission.
    pub fn log_fields(&self, max_log_line: usize) {
        let not_included = "(not included)";
        tracing::info!(
            sender = %self.sender,
            to = ?self.to,
            cc = ?self.cc,
            subject = %self.subject,
            reply_to = self.reply_to.as_deref().unwrap_or(not_included),
            references = self.references.as_deref().unwrap_or(not_included),
            in_reply_to = self.references.as_deref().unwrap_or(not_included),
            body = %self.body_preview(max_log_line),
            "Will send email"
        );
    }

    /// Convert to a lettre message.
    pub fn to_lettre(&self) -> Result<Message, MailError> {
        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(self.subject.clone());

        for addr in &self.to {
            builder = builder.to(parse_mailbox(addr)?);
        }
        for addr in &self.cc {
            builder = builder.cc(parse_mailbox(addr)?);
        }
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }
        if let Some(references) = &self.references {
            builder = builder
                .references(references.clone())
                .in_reply_to(references.clone());
        }

        let message = match &self.body {
            EmailBody::Html(html) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            EmailBody::Text(text) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
        };
        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

/// The service's sender identity.
///
/// With `from_user`, the submitter's name goes into both the display name and
/// the `admin+{from_user}` local part so replies can be routed back.
pub fn sender_mailbox(config: &MailConfig, from_user: Option<&str>) -> Result<Mailbox, MailError> {
    let (name, local) = match from_user {
        Some(user) => (
            format!("{user} via {}", config.sender_name),
            format!("admin+{user}"),
        ),
        None => (config.sender_name.clone(), "admin".to_string()),
    };
    let address = Address::new(&local, &config.sender_domain).map_err(|e| {
        MailError::InvalidAddress {
            address: format!("{local}@{}", config.sender_domain),
            reason: e.to_string(),
        }
    })?;
    Ok(Mailbox::new(Some(name), address))
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, MailError> {
    addr.trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::InvalidAddress {
            address: addr.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutboundEmail {
        let sender = sender_mailbox(&MailConfig::default(), None).unwrap();
        OutboundEmail::new(
            sender,
            vec!["x@y.com".into()],
            "Feature update",
            EmailBody::Html("<p>Changed</p>".into()),
        )
    }

    #[test]
    fn default_sender_is_admin_at_app_domain() {
        let sender = sender_mailbox(&MailConfig::default(), None).unwrap();
        assert_eq!(sender.email.to_string(), "admin@featurewatch-dev.appspotmail.com");
        assert_eq!(sender.name.as_deref(), Some("Featurewatch"));
    }

    #[test]
    fn from_user_is_embedded_in_name_and_local_part() {
        let sender = sender_mailbox(&MailConfig::default(), Some("jane")).unwrap();
        assert_eq!(
            sender.email.to_string(),
            "admin+jane@featurewatch-dev.appspotmail.com"
        );
        assert_eq!(sender.name.as_deref(), Some("jane via Featurewatch"));
    }

    #[test]
    fn from_user_with_invalid_chars_is_rejected() {
        assert!(sender_mailbox(&MailConfig::default(), Some("a b")).is_err());
    }

    #[test]
    fn check_initialized_accepts_complete_message() {
        assert!(email().check_initialized().is_ok());
    }

    #[test]
    fn check_initialized_rejects_empty_fields() {
        let mut e = email();
        e.to.clear();
        assert!(matches!(e.check_initialized(), Err(MailError::Incomplete("to"))));

        let mut e = email();
        e.subject = "  ".into();
        assert!(matches!(
            e.check_initialized(),
            Err(MailError::Incomplete("subject"))
        ));

        let mut e = email();
        e.body = EmailBody::Html(String::new());
        assert!(matches!(e.check_initialized(), Err(MailError::Incomplete("body"))));
    }

    #[test]
    fn references_set_both_threading_headers() {
        let message = email()
            .with_references(Some("<msg1@id>".into()))
            .to_lettre()
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("References: <msg1@id>"));
        assert!(raw.contains("In-Reply-To: <msg1@id>"));
    }

    #[test]
    fn no_threading_headers_without_references() {
        let message = email().to_lettre().unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(!raw.contains("In-Reply-To"));
        assert!(!raw.contains("References"));
    }

    #[test]
    fn reply_to_and_cc_are_written() {
        let message = email()
            .with_cc(vec!["cc@y.com".into()])
            .with_reply_to(Some("owner@y.com".into()))
            .to_lettre()
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("Reply-To: owner@y.com"));
        assert!(raw.contains("Cc: cc@y.com"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn invalid_recipient_fails_conversion() {
        let mut e = email();
        e.to = vec!["not an address".into()];
        assert!(matches!(e.to_lettre(), Err(MailError::InvalidAddress { .. })));
    }

    #[test]
    fn body_preview_truncates_on_char_boundary() {
        let mut e = email();
        e.body = EmailBody::Text("héllo wörld".into());
        assert_eq!(e.body_preview(4), "héll");
        assert_eq!(e.body_preview(100), "héllo wörld");
    }
}
