//! Client interceptor chain — per-call credential and header injection.
//!
//! Mirrors the header-building pattern already used by [`super::transport::JsonRpcTransport`]
//! (a `HashMap<String, String>` of extra headers merged into the outgoing request), but
//! applied per-call rather than once at transport construction, and driven by the target
//! agent's advertised [`SecurityScheme`]s rather than a fixed header set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::A2AResult;
use crate::types::AgentCard;

/// Per-call context passed to interceptors, analogous to
/// [`crate::server::ServerCallContext`] on the server side but scoped to an
/// outbound client call.
#[derive(Debug, Clone, Default)]
pub struct ClientCallContext {
    /// Opaque session identifier used to key credential lookups.
    pub session_id: Option<String>,
    /// Arbitrary call-scoped state an interceptor may read or write.
    pub state: HashMap<String, serde_json::Value>,
}

impl ClientCallContext {
    /// Create a call context for the given session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            state: HashMap::new(),
        }
    }
}

/// Extra per-call request options an interceptor can read or mutate —
/// currently just the outgoing HTTP headers, the same shape
/// [`super::transport::TransportConfig`] uses for transport-wide headers.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers to merge into the outgoing request, in addition to whatever
    /// the transport itself sets.
    pub headers: HashMap<String, String>,
}

/// Middleware hook run on every outbound RPC before the transport sends it.
///
/// Mirrors the Python SDK's `Interceptor` protocol: given the method name,
/// the request payload, the current options, the target agent's card, and
/// the call context, return the (possibly modified) payload and options.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Intercept an outbound call. Implementations that have nothing to add
    /// for a given `method`/`card` combination should return `payload` and
    /// `options` unchanged.
    async fn intercept(
        &self,
        method: &str,
        payload: serde_json::Value,
        options: RequestOptions,
        card: Option<&AgentCard>,
        call_context: Option<&ClientCallContext>,
    ) -> A2AResult<(serde_json::Value, RequestOptions)>;
}

/// Looks up credentials for a given session and security scheme name.
///
/// Keyed by `(session_id, scheme_name)` so a single client can hold
/// different credentials for different target agents or security schemes
/// within the same session.
#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Return the credential value for `scheme_name` in `session_id`'s
    /// session, or `None` if no credential is on file. A missing credential
    /// is not an error — [`AuthInterceptor`] simply skips that scheme.
    async fn get_credentials(&self, session_id: &str, scheme_name: &str) -> Option<String>;
}

/// An in-memory [`CredentialService`] keyed by `(session_id, scheme_name)`.
/// Suitable for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCredentialService {
    credentials: tokio::sync::RwLock<HashMap<(String, String), String>>,
}

impl InMemoryCredentialService {
    /// Create an empty credential service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential for `(session_id, scheme_name)`.
    pub async fn set_credentials(
        &self,
        session_id: impl Into<String>,
        scheme_name: impl Into<String>,
        credential: impl Into<String>,
    ) {
        self.credentials
            .write()
            .await
            .insert((session_id.into(), scheme_name.into()), credential.into());
    }
}

#[async_trait]
impl CredentialService for InMemoryCredentialService {
    async fn get_credentials(&self, session_id: &str, scheme_name: &str) -> Option<String> {
        self.credentials
            .read()
            .await
            .get(&(session_id.to_string(), scheme_name.to_string()))
            .cloned()
    }
}

/// Injects credentials into outgoing requests based on the target agent
/// card's advertised `security_schemes` / `security` requirements.
///
/// For each scheme named in the card's security requirements, looks up a
/// credential via the attached [`CredentialService`], keyed by the call
/// context's `session_id`. Schemes with no credential on file are skipped
/// silently — matching the spec's "missing credentials are not an error"
/// resolution, since a scheme may be optional or satisfied another way
/// (e.g. mutual TLS at the connection layer).
pub struct AuthInterceptor {
    credentials: Arc<dyn CredentialService>,
}

impl AuthInterceptor {
    /// Create an interceptor backed by the given credential service.
    pub fn new(credentials: Arc<dyn CredentialService>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    async fn intercept(
        &self,
        method: &str,
        payload: serde_json::Value,
        mut options: RequestOptions,
        card: Option<&AgentCard>,
        call_context: Option<&ClientCallContext>,
    ) -> A2AResult<(serde_json::Value, RequestOptions)> {
        let Some(card) = card else {
            return Ok((payload, options));
        };
        let Some(schemes) = &card.security_schemes else {
            return Ok((payload, options));
        };
        let Some(session_id) = call_context.and_then(|c| c.session_id.as_deref()) else {
            return Ok((payload, options));
        };

        for (scheme_name, scheme) in schemes {
            let Some(credential) = self.credentials.get_credentials(session_id, scheme_name).await
            else {
                continue;
            };

            use crate::types::{ApiKeyLocation, SecurityScheme};
            match scheme {
                SecurityScheme::ApiKey { location, name, .. } => match location {
                    ApiKeyLocation::Header => {
                        options.headers.insert(name.clone(), credential);
                    }
                    ApiKeyLocation::Query | ApiKeyLocation::Cookie => {
                        // Query/cookie placement is transport-specific; record it
                        // under a well-known key the transport can act on.
                        options
                            .headers
                            .insert(format!("X-A2A-ApiKey-{name}"), credential);
                    }
                },
                SecurityScheme::Http { scheme, .. } if scheme.eq_ignore_ascii_case("bearer") => {
                    options
                        .headers
                        .insert("Authorization".to_string(), format!("Bearer {credential}"));
                }
                SecurityScheme::Http { .. } => {
                    options
                        .headers
                        .insert("Authorization".to_string(), credential);
                }
                SecurityScheme::OAuth2 { .. } | SecurityScheme::OpenIdConnect { .. } => {
                    options
                        .headers
                        .insert("Authorization".to_string(), format!("Bearer {credential}"));
                }
                SecurityScheme::MutualTls { .. } => {
                    // Handled at the connection layer, not via headers.
                }
            }

            debug!(method, scheme = %scheme_name, "applied credential to outbound call");
        }

        Ok((payload, options))
    }
}

/// An ordered chain of [`Interceptor`]s, applied in registration order.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor (builder-style).
    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Register an interceptor in place.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Run every interceptor in order, threading the payload/options through each.
    pub async fn run(
        &self,
        method: &str,
        mut payload: serde_json::Value,
        mut options: RequestOptions,
        card: Option<&AgentCard>,
        call_context: Option<&ClientCallContext>,
    ) -> A2AResult<(serde_json::Value, RequestOptions)> {
        for interceptor in &self.interceptors {
            let (next_payload, next_options) = interceptor
                .intercept(method, payload, options, card, call_context)
                .await?;
            payload = next_payload;
            options = next_options;
        }
        Ok((payload, options))
    }
}
