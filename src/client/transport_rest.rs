//! REST-style HTTP+JSON transport binding.
//!
//! Maps the same operation set `JsonRpcTransport` sends as JSON-RPC envelopes
//! onto the REST route table from the A2A HTTP+JSON mapping (`POST
//! /v1/message:send`, `GET /v1/tasks/{id}`, ...). The [`Transport`] trait is
//! still expressed in terms of [`JsonRpcRequest`]/[`JsonRpcResponse`] — this
//! transport reads `request.method` to pick a route and re-wraps the REST
//! response body into the same `JsonRpcResponse` shape `A2AClient` already
//! expects, so callers never see the difference between bindings.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::{A2AError, A2AResult};
use crate::types::{AgentCard, JsonRpcRequest, JsonRpcResponse};

use super::interceptor::{ClientCallContext, InterceptorChain, RequestOptions};
use super::sse::SseStream;
use super::transport::Transport;

/// JSON-RPC-over-HTTP+JSON (REST) transport.
///
/// Shares the `Transport` trait's envelope shape with [`super::JsonRpcTransport`];
/// internally it dispatches each method to the REST route named for it in the
/// A2A specification's HTTP+JSON mapping.
#[derive(Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    /// Base URL, e.g. `https://agent.example.com` (routes are appended under `/v1`).
    base_url: String,
    interceptors: std::sync::Arc<InterceptorChain>,
    agent_card: Option<Box<AgentCard>>,
    call_context: Option<ClientCallContext>,
}

impl std::fmt::Debug for RestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestTransport {
    /// Create a transport targeting `base_url` (without a trailing `/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(60))
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            interceptors: std::sync::Arc::new(InterceptorChain::new()),
            agent_card: None,
            call_context: None,
        }
    }

    /// Attach an interceptor chain (builder-style), same contract as
    /// [`super::JsonRpcTransport::with_interceptors`].
    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = std::sync::Arc::new(interceptors);
        self
    }

    /// Attach the target agent's card (builder-style).
    pub fn with_agent_card(mut self, card: AgentCard) -> Self {
        self.agent_card = Some(Box::new(card));
        self
    }

    /// Attach a call context (builder-style).
    pub fn with_call_context(mut self, call_context: ClientCallContext) -> Self {
        self.call_context = Some(call_context);
        self
    }

    /// Build the full URL for a `/v1/...` route, normalizing the join via
    /// `url::Url` rather than bare string concatenation so a `base_url` with
    /// or without a trailing slash behaves the same way.
    fn route(&self, path: &str) -> String {
        let full_path = format!("/v1{path}");
        match url::Url::parse(&self.base_url) {
            Ok(mut base) => {
                base.set_path(&full_path);
                base.to_string()
            }
            Err(_) => format!("{}{}", self.base_url.trim_end_matches('/'), full_path),
        }
    }

    /// Run interceptors against the method-specific payload, returning the
    /// (possibly-rewritten) payload and the extra headers to merge onto the
    /// HTTP request.
    async fn apply_interceptors(
        &self,
        method: &str,
        payload: Value,
    ) -> A2AResult<(Value, HashMap<String, String>)> {
        let options = RequestOptions::default();
        let (payload, options) = self
            .interceptors
            .run(
                method,
                payload,
                options,
                self.agent_card.as_deref(),
                self.call_context.as_ref(),
            )
            .await?;
        Ok((payload, options.headers))
    }

    async fn dispatch(&self, request: &JsonRpcRequest, want_stream: bool) -> A2AResult<RestOutcome> {
        let payload = request.params.clone().unwrap_or(Value::Null);
        let (payload, extra_headers) = self.apply_interceptors(&request.method, payload).await?;

        let (verb, url, body) = match request.method.as_str() {
            "message/send" => (Method::POST, self.route("/message:send"), Some(payload)),
            "message/stream" => (Method::POST, self.route("/message:stream"), Some(payload)),
            "tasks/get" => {
                let id = require_str(&payload, "id")?;
                let mut url = self.route(&format!("/tasks/{id}"));
                if let Some(n) = payload.get("historyLength").and_then(Value::as_i64) {
                    url.push_str(&format!("?historyLength={n}"));
                }
                (Method::GET, url, None)
            }
            "tasks/cancel" => {
                let id = require_str(&payload, "id")?;
                (Method::POST, self.route(&format!("/tasks/{id}:cancel")), None)
            }
            "tasks/subscribe" | "tasks/resubscribe" => {
                let id = require_str(&payload, "id")?;
                (Method::GET, self.route(&format!("/tasks/{id}:subscribe")), None)
            }
            "tasks/pushNotificationConfig/set" => {
                let id = require_str(&payload, "taskId")?;
                (
                    Method::POST,
                    self.route(&format!("/tasks/{id}/pushNotificationConfigs")),
                    Some(payload),
                )
            }
            "tasks/pushNotificationConfig/get" => {
                let id = require_str(&payload, "id")?;
                let config_id = payload
                    .get("pushNotificationConfigId")
                    .and_then(Value::as_str)
                    .unwrap_or("default");
                (
                    Method::GET,
                    self.route(&format!("/tasks/{id}/pushNotificationConfigs/{config_id}")),
                    None,
                )
            }
            "tasks/pushNotificationConfig/list" => {
                let id = require_str(&payload, "id")?;
                (
                    Method::GET,
                    self.route(&format!("/tasks/{id}/pushNotificationConfigs")),
                    None,
                )
            }
            "tasks/pushNotificationConfig/delete" => {
                let id = require_str(&payload, "id")?;
                let config_id = require_str(&payload, "pushNotificationConfigId")?;
                (
                    Method::DELETE,
                    self.route(&format!("/tasks/{id}/pushNotificationConfigs/{config_id}")),
                    None,
                )
            }
            "getAuthenticatedExtendedCard" => (Method::GET, self.route("/card"), None),
            other => {
                return Err(A2AError::CapabilityUnsupported(format!(
                    "REST transport has no route for method '{other}'"
                )));
            }
        };

        let mut builder = self.client.request(verb, &url);
        if want_stream {
            builder = builder.header("Accept", "text/event-stream");
        }
        for (key, value) in &extra_headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = body {
            builder = builder.header("Content-Type", "application/json").json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                A2AError::Timeout(format!("REST request timed out: {e}"))
            } else if e.is_connect() {
                A2AError::Transport(format!("REST connection failed: {e}"))
            } else {
                A2AError::Transport(format!("REST request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(A2AError::Http {
                status: status.as_u16(),
                body: body_text,
            });
        }

        if want_stream {
            Ok(RestOutcome::Stream(response))
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| A2AError::Transport(format!("failed to read REST response body: {e}")))?;
            if bytes.is_empty() {
                Ok(RestOutcome::Value(Value::Null))
            } else {
                let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
                    A2AError::InvalidJson(format!("failed to parse REST response: {e}"))
                })?;
                Ok(RestOutcome::Value(value))
            }
        }
    }
}

enum RestOutcome {
    Value(Value),
    Stream(reqwest::Response),
}

fn require_str<'a>(payload: &'a Value, field: &str) -> A2AResult<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| A2AError::InvalidArgs(format!("missing '{field}' in request params")))
}

#[async_trait]
impl Transport for RestTransport {
    async fn send(&self, request: &JsonRpcRequest) -> A2AResult<JsonRpcResponse> {
        match self.dispatch(request, false).await? {
            RestOutcome::Value(value) => Ok(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id.clone(),
                result: Some(value),
                error: None,
            }),
            RestOutcome::Stream(_) => Err(A2AError::Transport(
                "REST transport returned a stream for a unary call".to_string(),
            )),
        }
    }

    async fn send_stream(&self, request: &JsonRpcRequest) -> A2AResult<SseStream> {
        match self.dispatch(request, true).await? {
            RestOutcome::Stream(response) => Ok(SseStream::from_response(response)),
            RestOutcome::Value(_) => Err(A2AError::Transport(
                "REST transport returned a unary body for a streaming call".to_string(),
            )),
        }
    }
}
