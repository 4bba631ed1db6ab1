//! Transport layer for A2A client communication.
//!
//! Provides the `Transport` trait for abstracting over different communication
//! protocols, and `JsonRpcTransport` for the standard JSON-RPC over HTTP binding.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{A2AError, A2AResult};
use crate::types::{AgentCard, JsonRpcRequest, JsonRpcResponse};
use crate::utils::extensions::HTTP_EXTENSION_HEADER;

use super::interceptor::{ClientCallContext, InterceptorChain, RequestOptions};
use super::sse::SseStream;

/// Transport abstraction for A2A communication.
///
/// Implementations handle the low-level details of sending JSON-RPC requests
/// and receiving responses (or SSE streams) over a particular protocol binding.
///
/// Python SDK ref: `ClientTransport` (abstract base class in `transports/base.py`)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a JSON-RPC request and receive a JSON-RPC response.
    async fn send(&self, request: &JsonRpcRequest) -> A2AResult<JsonRpcResponse>;

    /// Send a JSON-RPC request and receive an SSE event stream.
    ///
    /// Used for streaming methods like `message/stream` and `tasks/subscribe`.
    async fn send_stream(&self, request: &JsonRpcRequest) -> A2AResult<SseStream>;

    /// Close the transport and release any held resources.
    ///
    /// Python SDK ref: `ClientTransport.close()`, `JsonRpcTransport.close()`
    ///
    /// The default implementation is a no-op. Override if your transport holds
    /// resources (e.g., persistent connections) that need explicit cleanup.
    async fn close(&self) -> A2AResult<()> {
        Ok(())
    }
}

/// A transport that failed to construct, carrying the error forward so it
/// surfaces on first use instead of at factory-registration time.
///
/// [`super::factory::ClientFactory`] producers must build a `Transport`
/// synchronously and infallibly; transports whose constructor can fail
/// (e.g. a malformed endpoint URL) fall back to this rather than panicking.
pub(crate) struct FailedTransport {
    error: String,
}

impl FailedTransport {
    pub(crate) fn new(error: A2AError) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[async_trait]
impl Transport for FailedTransport {
    async fn send(&self, _request: &JsonRpcRequest) -> A2AResult<JsonRpcResponse> {
        Err(A2AError::Transport(self.error.clone()))
    }

    async fn send_stream(&self, _request: &JsonRpcRequest) -> A2AResult<SseStream> {
        Err(A2AError::Transport(self.error.clone()))
    }
}

/// Configuration for [`JsonRpcTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Request timeout. Defaults to 60 seconds.
    pub timeout: Duration,
    /// Additional HTTP headers to include on every request.
    pub headers: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            headers: HashMap::new(),
        }
    }
}

/// JSON-RPC over HTTP transport using `reqwest`.
///
/// This is the standard transport for the A2A JSON-RPC protocol binding.
/// It sends POST requests with `Content-Type: application/json` and parses
/// the response as a JSON-RPC result or error.
///
/// For streaming methods, the response is interpreted as an SSE event stream.
///
/// # Example
///
/// ```no_run
/// use a2a_rs::client::JsonRpcTransport;
///
/// let transport = JsonRpcTransport::new("http://localhost:7420/a2a");
/// ```
#[derive(Clone)]
pub struct JsonRpcTransport {
    client: reqwest::Client,
    url: String,
    interceptors: std::sync::Arc<InterceptorChain>,
    agent_card: Option<Box<AgentCard>>,
    call_context: Option<ClientCallContext>,
    requested_extensions: HashSet<String>,
}

impl std::fmt::Debug for JsonRpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcTransport")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl JsonRpcTransport {
    /// Create a new transport targeting the given A2A endpoint URL.
    ///
    /// Uses default configuration (60s timeout, no extra headers).
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, TransportConfig::default())
    }

    /// Create a new transport with custom configuration.
    pub fn with_config(url: impl Into<String>, config: TransportConfig) -> Self {
        let mut default_headers = HeaderMap::new();
        for (key, value) in &config.headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                default_headers.insert(name, val);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            url: url.into(),
            interceptors: std::sync::Arc::new(InterceptorChain::new()),
            agent_card: None,
            call_context: None,
            requested_extensions: HashSet::new(),
        }
    }

    /// Create a new transport with an existing `reqwest::Client`.
    ///
    /// Useful when you want to share a connection pool or configure TLS
    /// settings externally.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            url: url.into(),
            interceptors: std::sync::Arc::new(InterceptorChain::new()),
            agent_card: None,
            call_context: None,
            requested_extensions: HashSet::new(),
        }
    }

    /// Returns the URL this transport sends requests to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create a transport with a custom timeout (builder-style).
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let mut config = TransportConfig::default();
        config.timeout = timeout;
        Self::with_config(self.url, config)
    }

    /// Add a custom header (builder-style).
    pub fn with_header(self, key: &str, value: &str) -> Self {
        // Rebuild the client with the new header
        let mut config = TransportConfig::default();
        config.headers.insert(key.to_string(), value.to_string());
        Self::with_config(self.url, config)
    }

    /// Attach an interceptor chain run against every outbound call before
    /// it's sent (builder-style).
    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = std::sync::Arc::new(interceptors);
        self
    }

    /// Attach the target agent's card, so interceptors can read its
    /// advertised security schemes (builder-style).
    pub fn with_agent_card(mut self, card: AgentCard) -> Self {
        self.agent_card = Some(Box::new(card));
        self
    }

    /// Attach a call context (e.g. a session id for credential lookups),
    /// forwarded to every interceptor invocation (builder-style).
    pub fn with_call_context(mut self, call_context: ClientCallContext) -> Self {
        self.call_context = Some(call_context);
        self
    }

    /// Declare extensions this client wants activated — sent on every
    /// request via the `X-A2A-Extensions` header (builder-style).
    pub fn with_requested_extensions(mut self, extensions: HashSet<String>) -> Self {
        self.requested_extensions = extensions;
        self
    }

    /// Run the interceptor chain for `request`, returning the extra headers
    /// to merge onto the outgoing HTTP call. The (possibly-rewritten)
    /// `params` payload the interceptors returned is applied back onto a
    /// clone of the request.
    async fn apply_interceptors(&self, request: &JsonRpcRequest) -> A2AResult<(JsonRpcRequest, HashMap<String, String>)> {
        let mut options = RequestOptions::default();
        if !self.requested_extensions.is_empty() {
            options.headers.insert(
                HTTP_EXTENSION_HEADER.to_string(),
                self.requested_extensions.iter().cloned().collect::<Vec<_>>().join(","),
            );
        }

        let payload = request.params.clone().unwrap_or(serde_json::Value::Null);
        let (payload, options) = self
            .interceptors
            .run(
                &request.method,
                payload,
                options,
                self.agent_card.as_deref(),
                self.call_context.as_ref(),
            )
            .await?;

        let mut rewritten = request.clone();
        if !payload.is_null() {
            rewritten.params = Some(payload);
        }

        Ok((rewritten, options.headers))
    }
}

#[async_trait]
impl Transport for JsonRpcTransport {
    async fn send(&self, request: &JsonRpcRequest) -> A2AResult<JsonRpcResponse> {
        let (request, extra_headers) = self.apply_interceptors(request).await?;

        let body = serde_json::to_vec(&request).map_err(|e| {
            A2AError::Transport(format!("failed to serialize JSON-RPC request: {e}"))
        })?;

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        for (key, value) in &extra_headers {
            builder = builder.header(key, value);
        }

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    A2AError::Timeout(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    A2AError::Transport(format!("connection failed: {e}"))
                } else {
                    A2AError::Transport(format!("HTTP request failed: {e}"))
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| A2AError::Transport(format!("failed to read response body: {e}")))?;

        let rpc_response: JsonRpcResponse = serde_json::from_slice(&bytes).map_err(|e| {
            A2AError::InvalidJson(format!("failed to parse JSON-RPC response: {e}"))
        })?;

        Ok(rpc_response)
    }

    async fn send_stream(&self, request: &JsonRpcRequest) -> A2AResult<SseStream> {
        let (request, extra_headers) = self.apply_interceptors(request).await?;

        let body = serde_json::to_vec(&request).map_err(|e| {
            A2AError::Transport(format!("failed to serialize JSON-RPC request: {e}"))
        })?;

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream");
        for (key, value) in &extra_headers {
            builder = builder.header(key, value);
        }

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    A2AError::Timeout(format!("stream request timed out: {e}"))
                } else if e.is_connect() {
                    A2AError::Transport(format!("stream connection failed: {e}"))
                } else {
                    A2AError::Transport(format!("stream HTTP request failed: {e}"))
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

        Ok(SseStream::from_response(response))
    }
}
