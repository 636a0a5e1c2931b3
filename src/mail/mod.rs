//! Email pipeline.
//!
//! - `address` — staging recipient rewriting
//! - `message` — transport-ready `OutboundEmail` and sender identity
//! - `transport` — `MailTransport` trait and the lettre SMTP implementation
//! - `outbound` — outbound-email task dispatch
//! - `bounce` — bounce notices and operator escalation
//! - `parsed` — `ParsedEmail`, header and body access over mail-parser
//! - `inbound` — inbound reply ingestion

pub mod address;
pub mod bounce;
pub mod inbound;
pub mod message;
pub mod outbound;
pub mod parsed;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bounce::{BounceIngestor, BounceNotification};
pub use inbound::{InboundMailIngestor, InboundOutcome, InboundReplyTask};
pub use message::{EmailBody, OutboundEmail};
pub use outbound::{OutboundMailDispatcher, OutboundMailTask};
pub use transport::{MailTransport, SmtpConfig, SmtpMailTransport};

use tracing::info;

use crate::config::MailConfig;
use crate::error::MailError;

/// What happened to a message handed to [`deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Sending is disabled by configuration.
    Skipped,
}

/// Log `email` and send it unless sending is globally disabled.
///
/// No retries here: the task queue redelivers on failure.
pub async fn deliver(
    config: &MailConfig,
    transport: &dyn MailTransport,
    email: &OutboundEmail,
) -> Result<Delivery, MailError> {
    email.log_fields(config.max_log_line);
    if !config.send_email {
        info!(subject = %email.subject, "Email not sent because sending is disabled");
        return Ok(Delivery::Skipped);
    }
    transport.send(email).await?;
    Ok(Delivery::Sent)
}
