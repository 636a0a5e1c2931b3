//! Inbound email ingestion.
//!
//! The mail transport POSTs every message addressed to the app. Cheap checks
//! run first; anything that survives is reduced to an [`InboundReplyTask`]
//! and handed to the intent-detection service through the task queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::parsed::ParsedEmail;
use crate::config::MailConfig;
use crate::error::IngestError;
use crate::tasks::{DETECT_INTENT_PATH, TaskEnqueuer, enqueue_task};

/// Parsing very large messages could exhaust memory.
pub const MAX_BODY_SIZE: usize = 20 * 1024 * 1024;

/// Result of an ingestion attempt. Every variant is acknowledged to the
/// transport with a 2xx: retrying cannot change a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Done,
    WrongAddress,
    TooBig,
    WrongPrecedence,
    MissingFrom,
}

impl InboundOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            InboundOutcome::Done => "Done",
            InboundOutcome::WrongAddress => "Wrong address",
            InboundOutcome::TooBig => "Too big",
            InboundOutcome::WrongPrecedence => "Wrong precedence",
            InboundOutcome::MissingFrom => "Missing From",
        }
    }
}

/// Payload for the intent-detection task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReplyTask {
    pub to_addr: String,
    pub from_addr: String,
    pub subject: String,
    pub in_reply_to: String,
    pub body: String,
}

pub struct InboundMailIngestor {
    config: Arc<MailConfig>,
    enqueuer: Arc<dyn TaskEnqueuer>,
}

impl InboundMailIngestor {
    pub fn new(config: Arc<MailConfig>, enqueuer: Arc<dyn TaskEnqueuer>) -> Self {
        Self { config, enqueuer }
    }

    pub async fn ingest(
        &self,
        destination_addr: &str,
        raw_message: &[u8],
    ) -> Result<InboundOutcome, IngestError> {
        info!(addr = destination_addr, size = raw_message.len(), "Inbound email received");

        let Some(to_addr) = self.accept_destination(destination_addr) else {
            return Ok(InboundOutcome::WrongAddress);
        };

        if raw_message.len() > MAX_BODY_SIZE {
            info!(size = raw_message.len(), "Message too big, ignoring");
            return Ok(InboundOutcome::TooBig);
        }

        let Some(email) = ParsedEmail::parse(raw_message) else {
            info!("Message could not be parsed");
            return Ok(InboundOutcome::MissingFrom);
        };

        let precedence = email.header("precedence").unwrap_or_default();
        if precedence.eq_ignore_ascii_case("bulk") || precedence.eq_ignore_ascii_case("junk") {
            info!(%precedence, "Precedence indicates an autoresponder");
            return Ok(InboundOutcome::WrongPrecedence);
        }

        let Some(from_addr) = originating_address(&email) else {
            info!("Could not parse from address");
            return Ok(InboundOutcome::MissingFrom);
        };

        // Only the first plain text part is considered.
        let body = email.plain_text_parts().next().unwrap_or_default();

        let task = InboundReplyTask {
            to_addr,
            from_addr,
            subject: email.subject().unwrap_or_default(),
            in_reply_to: email.header("in-reply-to").unwrap_or_default(),
            body,
        };
        info!(
            from = %task.from_addr,
            subject = %task.subject,
            in_reply_to = %task.in_reply_to,
            body_len = task.body.len(),
            "Forwarding inbound email to intent detection"
        );

        enqueue_task(self.enqueuer.as_ref(), DETECT_INTENT_PATH, &task).await?;
        Ok(InboundOutcome::Done)
    }

    /// Outcome for a message whose body exceeded [`MAX_BODY_SIZE`] and was
    /// never read.
    pub fn reject_oversized(&self, destination_addr: &str, size: Option<u64>) -> InboundOutcome {
        if self.accept_destination(destination_addr).is_none() {
            return InboundOutcome::WrongAddress;
        }
        info!(?size, "Message too big, ignoring");
        InboundOutcome::TooBig
    }

    /// The destination, if it is our inbound address. The router has
    /// already percent-decoded the path segment once.
    fn accept_destination(&self, destination_addr: &str) -> Option<String> {
        if !destination_addr.eq_ignore_ascii_case(&self.config.inbound_email_addr) {
            info!(addr = %destination_addr, "Message not sent directly to our address");
            return None;
        }
        Some(destination_addr.to_string())
    }
}

/// `X-Original-From` wins over `From` (mailing lists rewrite `From`).
fn originating_address(email: &ParsedEmail) -> Option<String> {
    email
        .original_from_addresses()
        .into_iter()
        .next()
        .or_else(|| email.from_addresses().into_iter().next())
}
