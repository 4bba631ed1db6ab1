//! Push notifier — webhook delivery of task snapshots (spec §4.8).
//!
//! When a [`super::request_handler::DefaultRequestHandler`] is configured
//! with both a [`super::push_notification_store::PushNotificationConfigStore`]
//! and a [`PushNotificationSender`], every `Task` snapshot forwarded to a
//! streaming caller is also POSTed, best-effort, to each callback URL
//! registered for that task. Delivery failures are logged and never
//! propagate back to the task or the caller (spec §7: "Push-notification
//! delivery errors are logged and never surface").

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::{PushNotificationConfig, Task};

/// Delivers a task snapshot to a configured push notification endpoint.
///
/// Implementations must not propagate delivery failures — `send` has no
/// `Result` because there is nothing for a caller to meaningfully do with
/// an error here beyond what the implementation already logs.
#[async_trait]
pub trait PushNotificationSender: Send + Sync {
    /// Best-effort delivery of `task` to `config`'s callback URL.
    async fn send(&self, task: &Task, config: &PushNotificationConfig);
}

/// HTTP push notification sender — POSTs the task JSON body to each
/// configured callback URL, with bounded exponential-backoff retries.
///
/// Mirrors the `reqwest`-based HTTP client pattern already used by
/// [`crate::client::transport::JsonRpcTransport`], applied server-side for
/// outbound webhook delivery rather than inbound RPC.
#[derive(Debug, Clone)]
pub struct HttpPushNotificationSender {
    client: reqwest::Client,
    max_attempts: u32,
    base_backoff: Duration,
}

impl HttpPushNotificationSender {
    /// Create a sender with default retry policy (3 attempts, 200ms base backoff).
    pub fn new() -> Self {
        Self::with_retry_policy(3, Duration::from_millis(200))
    }

    /// Create a sender with an explicit retry policy.
    ///
    /// `max_attempts` is the total number of delivery attempts (including the
    /// first). Backoff between attempts doubles each time, starting at
    /// `base_backoff`.
    pub fn with_retry_policy(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Create a sender using a caller-supplied `reqwest::Client` (e.g. to
    /// share a connection pool or custom TLS config with other outbound calls).
    pub fn with_client(client: reqwest::Client, max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }
}

impl Default for HttpPushNotificationSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushNotificationSender for HttpPushNotificationSender {
    async fn send(&self, task: &Task, config: &PushNotificationConfig) {
        let body = match serde_json::to_vec(task) {
            Ok(b) => b,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to serialize task for push notification");
                return;
            }
        };

        for attempt in 0..self.max_attempts {
            let mut request = self
                .client
                .post(&config.url)
                .header("Content-Type", "application/json");

            if let Some(token) = &config.token {
                request = request.header("X-A2A-Notification-Token", token.as_str());
            }
            if let Some(auth) = &config.authentication {
                if let Some(creds) = &auth.credentials {
                    if auth.schemes.iter().any(|s| s.eq_ignore_ascii_case("bearer")) {
                        request = request.header("Authorization", format!("Bearer {creds}"));
                    } else if !auth.schemes.is_empty() {
                        request = request.header("Authorization", creds.as_str());
                    }
                }
            }

            match request.body(body.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(task_id = %task.id, url = %config.url, "Delivered push notification");
                    return;
                }
                Ok(response) => {
                    warn!(
                        task_id = %task.id,
                        url = %config.url,
                        status = response.status().as_u16(),
                        attempt,
                        "Push notification endpoint returned non-success status"
                    );
                }
                Err(e) => {
                    warn!(task_id = %task.id, url = %config.url, attempt, error = %e, "Push notification delivery failed");
                }
            }

            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.base_backoff * 2u32.pow(attempt)).await;
            }
        }

        warn!(task_id = %task.id, url = %config.url, "Push notification delivery exhausted retries");
    }
}
