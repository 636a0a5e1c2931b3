//! Outbound notification emails delivered by the task queue.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use super::address::{format_staging_cc, format_staging_email};
use super::message::{EmailBody, OutboundEmail, sender_mailbox};
use super::transport::MailTransport;
use super::{Delivery, deliver};
use crate::config::MailConfig;
use crate::error::{DispatchError, TaskQueueError};
use crate::tasks::{OUTBOUND_EMAIL_PATH, QUEUE_NAME_HEADER, TaskEnqueuer, enqueue_task};

/// Payload of an outbound-email task.
///
/// `to` and `cc` may arrive as a bare address or a list; both are normalized
/// to lists here and nowhere else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundMailTask {
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub from_user: Option<String>,
    #[serde(default, deserialize_with = "or_empty")]
    pub subject: String,
    #[serde(default, rename = "html", deserialize_with = "or_empty")]
    pub html_body: String,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let list = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(addr)) => vec![addr],
        Some(OneOrMany::Many(addrs)) => addrs,
    };
    Ok(list.into_iter().filter(|a| !a.trim().is_empty()).collect())
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

/// `null` reads as an empty string so validation can name the field.
fn or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl OutboundMailTask {
    /// Name the first required field that is missing.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.to.is_empty() {
            return Err(DispatchError::MissingParameter("to"));
        }
        if self.subject.is_empty() {
            return Err(DispatchError::MissingParameter("subject"));
        }
        if self.html_body.is_empty() {
            return Err(DispatchError::MissingParameter("html"));
        }
        Ok(())
    }
}

/// Hand an outbound email to the task queue; the dispatcher sends it later.
pub async fn enqueue_outbound_email(
    enqueuer: &dyn TaskEnqueuer,
    task: &OutboundMailTask,
) -> Result<(), TaskQueueError> {
    enqueue_task(enqueuer, OUTBOUND_EMAIL_PATH, task).await
}

/// Sends one outbound-email task through the mail transport.
pub struct OutboundMailDispatcher {
    config: Arc<MailConfig>,
    transport: Arc<dyn MailTransport>,
}

impl OutboundMailDispatcher {
    pub fn new(config: Arc<MailConfig>, transport: Arc<dyn MailTransport>) -> Self {
        Self { config, transport }
    }

    /// Only the queue transport may trigger a send, outside test and dev mode.
    pub fn require_task_header(&self, queue_name: Option<&str>) -> Result<(), DispatchError> {
        if self.config.trusts_any_caller() || queue_name.is_some() {
            return Ok(());
        }
        Err(DispatchError::NotFromQueue(QUEUE_NAME_HEADER))
    }

    /// Apply staging redirection to the recipient lists.
    fn redirect_recipients(
        &self,
        to: Vec<String>,
        cc: Vec<String>,
    ) -> Result<(Vec<String>, Vec<String>), DispatchError> {
        let staging = &self.config.staging;
        if !staging.enabled || staging.is_exempt(&to) {
            return Ok((to, cc));
        }
        let to = to
            .iter()
            .map(|addr| format_staging_email(addr, staging))
            .collect::<Result<Vec<_>, _>>()?;
        let cc = cc
            .iter()
            .map(|addr| format_staging_cc(addr, staging))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((to, cc))
    }

    /// Build the message for `task` without sending it.
    pub fn build(&self, task: OutboundMailTask) -> Result<OutboundEmail, DispatchError> {
        task.validate()?;
        let (to, cc) = self.redirect_recipients(task.to, task.cc)?;

        let sender = sender_mailbox(&self.config, task.from_user.as_deref())
            .map_err(DispatchError::Construction)?;

        let email = OutboundEmail::new(sender, to, task.subject, EmailBody::Html(task.html_body))
            .with_cc(cc)
            .with_reply_to(task.reply_to)
            .with_references(task.references);
        email
            .check_initialized()
            .map_err(DispatchError::Construction)?;
        // Catch unparsable recipients here rather than as a transport failure.
        email.to_lettre().map_err(DispatchError::Construction)?;
        Ok(email)
    }

    pub async fn send(
        &self,
        queue_name: Option<&str>,
        task: OutboundMailTask,
    ) -> Result<Delivery, DispatchError> {
        self.require_task_header(queue_name)?;
        info!(to = ?task.to, subject = %task.subject, "Outbound email task received");

        let email = self.build(task)?;
        deliver(&self.config, self.transport.as_ref(), &email)
            .await
            .map_err(DispatchError::Transport)
    }
}
