//! Recording stand-ins for the mail transport and task queue.

use std::sync::Mutex;

use async_trait::async_trait;

use super::message::OutboundEmail;
use super::transport::MailTransport;
use crate::error::{MailError, TaskQueueError};
use crate::tasks::TaskEnqueuer;

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundEmail>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::SendFailed("relay refused".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEnqueuer {
    tasks: Mutex<Vec<(String, serde_json::Value)>>,
    fail: bool,
}

impl RecordingEnqueuer {
    pub fn failing() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn tasks(&self) -> Vec<(String, serde_json::Value)> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskEnqueuer for RecordingEnqueuer {
    async fn enqueue(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<(), TaskQueueError> {
        if self.fail {
            return Err(TaskQueueError::Rejected {
                path: path.to_string(),
                status: 503,
            });
        }
        self.tasks.lock().unwrap().push((path.to_string(), payload));
        Ok(())
    }
}
