//! Task queue client for deferred HTTP invocations

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{Error, Result};

/// Enqueues an HTTP POST task to fire at or after a scheduled instant.
#[derive(Clone)]
pub struct TaskQueue {
    client: Client,
    endpoint: String,
}

impl TaskQueue {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub async fn create_task(
        &self,
        url: &str,
        body: &Value,
        schedule_time: DateTime<Utc>,
    ) -> Result<()> {
        let task = json!({
            "task": {
                "http_request": {
                    "http_method": "POST",
                    "url": url,
                    "headers": {"Content-Type": "application/json"},
                    "body": body,
                },
                "schedule_time": schedule_time.to_rfc3339(),
            }
        });

        let response = self.client.post(&self.endpoint).json(&task).send().await?;
        if !response.status().is_success() {
            return Err(Error::Dispatch(format!(
                "task queue returned {}",
                response.status()
            )));
        }

        info!(%url, schedule_time = %schedule_time, "Created scheduled task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn task_carries_target_and_schedule_time() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "task": {
                    "http_request": {
                        "http_method": "POST",
                        "url": "https://fn.example/run"
                    },
                    "schedule_time": "2025-12-10T19:00:00+00:00"
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let queue = TaskQueue::new(&server.uri());
        queue
            .create_task(
                "https://fn.example/run",
                &json!({"x": 2}),
                "2025-12-10T19:00:00Z".parse().unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn queue_failure_is_a_dispatch_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let queue = TaskQueue::new(&server.uri());
        let err = queue
            .create_task("https://fn.example/run", &json!({}), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
    }
}
