//! Client factory — picks a transport from an [`AgentCard`] and a local config.
//!
//! Mirrors [`super::transport::TransportConfig`]'s plain-struct style but
//! scoped to transport *selection* rather than a single transport's wire
//! options, and adds a `register(label, producer)` registry so callers can
//! plug in transports this crate doesn't ship (e.g. a custom binding) the
//! same way [`super::interceptor::InterceptorChain`] lets callers plug in
//! interceptors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{A2AError, A2AResult};
use crate::types::AgentCard;

use super::interceptor::InterceptorChain;
use super::transport::{JsonRpcTransport, Transport, TransportConfig};

/// The JSON-RPC transport label, as it appears in `AgentCard.preferred_transport`
/// / `AgentInterface.transport` and in [`ClientConfig::supported_transports`].
pub const JSONRPC: &str = "JSONRPC";

/// The REST (HTTP+JSON) transport label.
#[cfg(feature = "rest")]
pub const HTTP_JSON: &str = "HTTP+JSON";

/// The gRPC transport label.
#[cfg(feature = "grpc")]
pub const GRPC: &str = "GRPC";

/// Local client configuration driving transport selection.
///
/// Extends the wire-level [`TransportConfig`] with the selection and
/// capability knobs a factory needs: which transports this client can
/// speak, whether its own preference order wins over the server's, and
/// which protocol extensions it wants active.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transport labels this client can speak, in preference order.
    /// Defaults to `["JSONRPC"]`.
    pub supported_transports: Vec<String>,

    /// If `true`, transport selection iterates `supported_transports` in
    /// order and picks the first the server also advertises. If `false`,
    /// it iterates the server's advertised transports in card order and
    /// picks the first this client also supports.
    pub use_client_preference: bool,

    /// Whether this client wants to use streaming calls when available.
    pub streaming: bool,

    /// Whether this client wants to use polling (`tasks/get`) in place of
    /// streaming when streaming is unavailable or undesired.
    pub polling: bool,

    /// Extension URIs this client wants activated, sent via the
    /// `X-A2A-Extensions` header on every call.
    pub extensions: Vec<String>,

    /// Wire-level options (timeout, static headers) applied to the chosen transport.
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            supported_transports: vec![JSONRPC.to_string()],
            use_client_preference: false,
            streaming: true,
            polling: false,
            extensions: Vec::new(),
            transport: TransportConfig::default(),
        }
    }
}

/// Builds a concrete [`Transport`] for a selected `(protocol, url)` pair.
///
/// Mirrors the Python SDK's transport-producer callables: given the
/// resolved card, the chosen url, the client config, and the interceptor
/// chain to attach, produce a boxed transport instance.
pub type TransportProducer = Arc<
    dyn Fn(&AgentCard, &str, &ClientConfig, InterceptorChain) -> Box<dyn Transport> + Send + Sync,
>;

/// Selects and builds transports for agent cards.
///
/// Ships with a `JSONRPC` producer registered by default; additional
/// protocols (e.g. a `rest`/`grpc` feature's transports) can be registered
/// via [`ClientFactory::register`].
pub struct ClientFactory {
    producers: HashMap<String, TransportProducer>,
}

impl ClientFactory {
    /// Create a factory with the default `JSONRPC` producer registered.
    pub fn new() -> Self {
        let mut factory = Self {
            producers: HashMap::new(),
        };
        factory.register(JSONRPC, Arc::new(|_card, url, config, _interceptors| {
            Box::new(JsonRpcTransport::with_config(url, config.transport.clone())) as Box<dyn Transport>
        }));
        #[cfg(feature = "rest")]
        factory.register(HTTP_JSON, Arc::new(|_card, url, _config, interceptors| {
            Box::new(super::transport_rest::RestTransport::new(url).with_interceptors(interceptors))
                as Box<dyn Transport>
        }));
        #[cfg(feature = "grpc")]
        factory.register(GRPC, Arc::new(|card, url, _config, interceptors| {
            match crate::grpc::GrpcTransport::new(url.to_string()) {
                Ok(transport) => Box::new(
                    transport
                        .with_interceptors(interceptors)
                        .with_agent_card(card.clone()),
                ) as Box<dyn Transport>,
                Err(err) => Box::new(super::transport::FailedTransport::new(err)) as Box<dyn Transport>,
            }
        }));
        factory
    }

    /// Register a transport producer under `label` (builder mutation, not
    /// consuming — factories are typically built once and reused).
    pub fn register(&mut self, label: impl Into<String>, producer: TransportProducer) {
        self.producers.insert(label.into(), producer);
    }

    /// Select a `(protocol, url)` pair for `card` under `config`, per the
    /// spec's transport-selection algorithm:
    ///
    /// - `server_set` = `{preferred_transport: url} ∪ {iface.transport: iface.url}`.
    /// - `client_set` = `config.supported_transports`.
    /// - If `use_client_preference`: iterate `client_set` in order, pick the
    ///   first present in `server_set`.
    /// - Otherwise: iterate `server_set` in card order, pick the first
    ///   present in `client_set`.
    /// - No intersection → error.
    pub fn select_transport(&self, card: &AgentCard, config: &ClientConfig) -> A2AResult<(String, String)> {
        let mut server_set: Vec<(String, String)> = Vec::new();

        let preferred = card
            .preferred_transport
            .clone()
            .unwrap_or_else(|| JSONRPC.to_string());
        server_set.push((preferred, card.url.clone()));

        for iface in &card.supported_interfaces {
            server_set.push((iface.transport.clone(), iface.url.clone()));
        }
        if let Some(additional) = &card.additional_interfaces {
            for iface in additional {
                server_set.push((iface.transport.clone(), iface.url.clone()));
            }
        }

        let client_set = &config.supported_transports;

        if config.use_client_preference {
            for label in client_set {
                if let Some((_, url)) = server_set.iter().find(|(t, _)| t == label) {
                    return Ok((label.clone(), url.clone()));
                }
            }
        } else {
            for (label, url) in &server_set {
                if client_set.iter().any(|l| l == label) {
                    return Ok((label.clone(), url.clone()));
                }
            }
        }

        Err(A2AError::InvalidArgs(
            "no compatible transports found".to_string(),
        ))
    }

    /// Select a transport and build it via the registered producer.
    pub fn create(
        &self,
        card: &AgentCard,
        config: &ClientConfig,
        interceptors: InterceptorChain,
    ) -> A2AResult<Box<dyn Transport>> {
        let (label, url) = self.select_transport(card, config)?;
        let producer = self.producers.get(&label).ok_or_else(|| {
            A2AError::InvalidArgs(format!("no transport producer registered for '{label}'"))
        })?;
        Ok(producer(card, &url, config, interceptors))
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}
