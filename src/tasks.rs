//! Task queue submission.
//!
//! The queue itself is external: it accepts a JSON payload for a logical
//! handler path and redelivers at least once until the handler returns 2xx.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TaskQueueError;

/// Handler path for outbound notification emails.
pub const OUTBOUND_EMAIL_PATH: &str = "/tasks/outbound-email";

/// Handler path of the downstream intent-detection service.
pub const DETECT_INTENT_PATH: &str = "/tasks/detect-intent";

/// Header the queue transport sets on every task delivery.
pub const QUEUE_NAME_HEADER: &str = "X-AppEngine-QueueName";

/// Durable, at-least-once task submission.
#[async_trait]
pub trait TaskEnqueuer: Send + Sync {
    async fn enqueue(&self, path: &str, payload: serde_json::Value)
    -> Result<(), TaskQueueError>;
}

/// Serialize `task` and submit it to `path`.
pub async fn enqueue_task<T: Serialize>(
    enqueuer: &dyn TaskEnqueuer,
    path: &str,
    task: &T,
) -> Result<(), TaskQueueError> {
    let payload = serde_json::to_value(task).map_err(|e| TaskQueueError::Serialization {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    enqueuer.enqueue(path, payload).await
}

/// Submits tasks by POSTing JSON to the queue service.
pub struct HttpTaskEnqueuer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskEnqueuer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl TaskEnqueuer for HttpTaskEnqueuer {
    async fn enqueue(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<(), TaskQueueError> {
        let task_id = Uuid::new_v4();
        debug!(%task_id, path, "Enqueuing task");

        let response = self
            .client
            .post(self.url_for(path))
            .header("X-Task-Id", task_id.to_string())
            .json(&payload)
            .send()
            .await
            .map_err(|e| TaskQueueError::EnqueueFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaskQueueError::Rejected {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        info!(%task_id, path, "Task enqueued");
        Ok(())
    }
}
