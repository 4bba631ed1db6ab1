//! gRPC client transport.
//!
//! Implements the same [`Transport`] trait [`crate::client::JsonRpcTransport`]
//! and [`crate::client::RestTransport`] implement, so `A2AClient` never has
//! to know which wire binding it's talking over. `request.method` is mapped
//! onto an `A2AService` RPC exactly the way `RestTransport::dispatch` maps it
//! onto a REST route; the JSON-RPC envelope stays the uniform parameter shape
//! this crate threads through all three bindings, it just never touches the
//! wire here.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::error::{A2AError, A2AResult};
use crate::types::{AgentCard, JsonRpcRequest, JsonRpcResponse, SendMessageResponse};

use super::convert;
use super::pb;
use pb::a2a_service_client::A2aServiceClient;

use crate::client::interceptor::{ClientCallContext, InterceptorChain, RequestOptions};
use crate::client::sse::SseStream;
use crate::client::transport::Transport;

/// gRPC transport for the A2A protocol, built on `tonic`'s generated
/// `A2aServiceClient`.
#[derive(Clone)]
pub struct GrpcTransport {
    client: A2aServiceClient<Channel>,
    interceptors: std::sync::Arc<InterceptorChain>,
    agent_card: Option<Box<AgentCard>>,
    call_context: Option<ClientCallContext>,
}

impl std::fmt::Debug for GrpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTransport").finish_non_exhaustive()
    }
}

impl GrpcTransport {
    /// Connect lazily to `endpoint` (e.g. `http://localhost:50051`). The
    /// connection is established on first call, not at construction time —
    /// matching how `JsonRpcTransport`/`RestTransport` never probe the peer
    /// up front either.
    pub fn new(endpoint: impl Into<String>) -> A2AResult<Self> {
        let endpoint = Endpoint::from_shared(endpoint.into())
            .map_err(|e| A2AError::InvalidArgs(format!("invalid gRPC endpoint: {e}")))?;
        let channel = endpoint.connect_lazy();
        Ok(Self {
            client: A2aServiceClient::new(channel),
            interceptors: std::sync::Arc::new(InterceptorChain::new()),
            agent_card: None,
            call_context: None,
        })
    }

    /// Build a transport over an already-constructed `tonic` channel —
    /// useful for tests (in-process channels) or custom TLS setups.
    pub fn with_channel(channel: Channel) -> Self {
        Self {
            client: A2aServiceClient::new(channel),
            interceptors: std::sync::Arc::new(InterceptorChain::new()),
            agent_card: None,
            call_context: None,
        }
    }

    /// Attach an interceptor chain (builder-style), same contract as the
    /// other two transports.
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

    /// Attach interceptor-contributed headers as gRPC metadata entries.
    fn with_metadata<T>(request: &mut Request<T>, headers: &HashMap<String, String>) {
        for (key, value) in headers {
            if let (Ok(name), Ok(val)) = (
                tonic::metadata::MetadataKey::from_bytes(key.to_lowercase().as_bytes()),
                tonic::metadata::MetadataValue::try_from(value.as_str()),
            ) {
                request.metadata_mut().insert(name, val);
            }
        }
    }

    fn map_status(status: tonic::Status) -> A2AError {
        use tonic::Code;
        match status.code() {
            Code::NotFound => A2AError::TaskNotFound {
                message: status.message().to_string(),
                data: None,
            },
            Code::FailedPrecondition => A2AError::TaskNotCancelable {
                message: status.message().to_string(),
                data: None,
            },
            Code::InvalidArgument => A2AError::InvalidParams {
                message: status.message().to_string(),
                data: None,
            },
            Code::Unimplemented => A2AError::CapabilityUnsupported(status.message().to_string()),
            Code::DeadlineExceeded => A2AError::Timeout(status.message().to_string()),
            _ => A2AError::Transport(format!("gRPC error ({:?}): {}", status.code(), status.message())),
        }
    }

    fn require_str<'a>(payload: &'a Value, field: &str) -> A2AResult<&'a str> {
        payload
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| A2AError::InvalidArgs(format!("missing '{field}' in request params")))
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn send(&self, request: &JsonRpcRequest) -> A2AResult<JsonRpcResponse> {
        let payload = request.params.clone().unwrap_or(Value::Null);
        let (payload, headers) = self.apply_interceptors(&request.method, payload).await?;
        let mut client = self.client.clone();

        let result: Value = match request.method.as_str() {
            "message/send" => {
                let params: crate::types::SendMessageParams = serde_json::from_value(payload)
                    .map_err(|e| A2AError::InvalidArgs(format!("invalid message/send params: {e}")))?;
                let mut req = Request::new(convert::send_message_request(params)?);
                Self::with_metadata(&mut req, &headers);
                let response = client.send_message(req).await.map_err(Self::map_status)?;
                let event: crate::types::StreamResponse = response.into_inner().try_into()?;
                serde_json::to_value(send_message_response_from_event(event)?)
                    .map_err(|e| A2AError::InvalidJson(e.to_string()))?
            }
            "tasks/get" => {
                let id = Self::require_str(&payload, "id")?.to_string();
                let history_length = payload.get("historyLength").and_then(Value::as_i64).map(|n| n as i32);
                let mut req = Request::new(pb::GetTaskRequest {
                    id,
                    history_length,
                    tenant: payload.get("tenant").and_then(Value::as_str).map(String::from),
                });
                Self::with_metadata(&mut req, &headers);
                let task: crate::types::Task = client
                    .get_task(req)
                    .await
                    .map_err(Self::map_status)?
                    .into_inner()
                    .try_into()?;
                serde_json::to_value(task).map_err(|e| A2AError::InvalidJson(e.to_string()))?
            }
            "tasks/cancel" => {
                let id = Self::require_str(&payload, "id")?.to_string();
                let mut req = Request::new(pb::CancelTaskRequest { id, tenant: None });
                Self::with_metadata(&mut req, &headers);
                let task: crate::types::Task = client
                    .cancel_task(req)
                    .await
                    .map_err(Self::map_status)?
                    .into_inner()
                    .try_into()?;
                serde_json::to_value(task).map_err(|e| A2AError::InvalidJson(e.to_string()))?
            }
            "tasks/pushNotificationConfig/set" => {
                let task_id = Self::require_str(&payload, "taskId")?.to_string();
                let config: crate::types::PushNotificationConfig = serde_json::from_value(
                    payload.get("pushNotificationConfig").cloned().unwrap_or(Value::Null),
                )
                .map_err(|e| A2AError::InvalidArgs(format!("invalid pushNotificationConfig: {e}")))?;
                let config_id = config.id.clone().unwrap_or_default();
                let config_json = serde_json::to_string(&config)
                    .map_err(|e| A2AError::InvalidJson(e.to_string()))?;
                let mut req = Request::new(pb::SetTaskPushNotificationConfigRequest {
                    task_id,
                    config_id,
                    config_json,
                });
                Self::with_metadata(&mut req, &headers);
                let cfg = client
                    .set_task_push_notification_config(req)
                    .await
                    .map_err(Self::map_status)?
                    .into_inner();
                serde_json::to_value(convert::task_push_notification_config_from_pb(cfg)?)
                    .map_err(|e| A2AError::InvalidJson(e.to_string()))?
            }
            "tasks/pushNotificationConfig/get" => {
                let id = Self::require_str(&payload, "id")?.to_string();
                let config_id = payload
                    .get("pushNotificationConfigId")
                    .and_then(Value::as_str)
                    .map(String::from);
                let mut req = Request::new(pb::GetTaskPushNotificationConfigRequest {
                    id,
                    push_notification_config_id: config_id,
                });
                Self::with_metadata(&mut req, &headers);
                let cfg = client
                    .get_task_push_notification_config(req)
                    .await
                    .map_err(Self::map_status)?
                    .into_inner();
                serde_json::to_value(convert::task_push_notification_config_from_pb(cfg)?)
                    .map_err(|e| A2AError::InvalidJson(e.to_string()))?
            }
            "tasks/pushNotificationConfig/list" => {
                let id = Self::require_str(&payload, "id")?.to_string();
                let mut req = Request::new(pb::ListTaskPushNotificationConfigRequest { id });
                Self::with_metadata(&mut req, &headers);
                let resp = client
                    .list_task_push_notification_config(req)
                    .await
                    .map_err(Self::map_status)?
                    .into_inner();
                let configs = resp
                    .configs
                    .into_iter()
                    .map(convert::task_push_notification_config_from_pb)
                    .collect::<A2AResult<Vec<_>>>()?;
                serde_json::to_value(configs).map_err(|e| A2AError::InvalidJson(e.to_string()))?
            }
            "tasks/pushNotificationConfig/delete" => {
                let id = Self::require_str(&payload, "id")?.to_string();
                let config_id = Self::require_str(&payload, "pushNotificationConfigId")?.to_string();
                let mut req = Request::new(pb::DeleteTaskPushNotificationConfigRequest {
                    id,
                    push_notification_config_id: config_id,
                });
                Self::with_metadata(&mut req, &headers);
                client
                    .delete_task_push_notification_config(req)
                    .await
                    .map_err(Self::map_status)?;
                Value::Null
            }
            "getAuthenticatedExtendedCard" => {
                let mut req = Request::new(pb::AgentCardRequest {});
                Self::with_metadata(&mut req, &headers);
                let resp = client.get_agent_card(req).await.map_err(Self::map_status)?.into_inner();
                serde_json::from_str::<Value>(&resp.card_json)
                    .map_err(|e| A2AError::InvalidJson(format!("invalid agent card JSON from gRPC: {e}")))?
            }
            other => {
                return Err(A2AError::CapabilityUnsupported(format!(
                    "gRPC transport has no unary RPC for method '{other}'"
                )))
            }
        };

        Ok(JsonRpcResponse::success(request.id.clone(), result))
    }

    async fn send_stream(&self, request: &JsonRpcRequest) -> A2AResult<SseStream> {
        use futures::StreamExt;

        let payload = request.params.clone().unwrap_or(Value::Null);
        let (payload, headers) = self.apply_interceptors(&request.method, payload).await?;
        let mut client = self.client.clone();

        let streaming = match request.method.as_str() {
            "message/stream" => {
                let params: crate::types::SendMessageParams = serde_json::from_value(payload)
                    .map_err(|e| A2AError::InvalidArgs(format!("invalid message/stream params: {e}")))?;
                let mut req = Request::new(convert::send_message_request(params)?);
                Self::with_metadata(&mut req, &headers);
                client
                    .send_message_stream(req)
                    .await
                    .map_err(Self::map_status)?
                    .into_inner()
            }
            "tasks/subscribe" | "tasks/resubscribe" => {
                let id = Self::require_str(&payload, "id")?.to_string();
                let mut req = Request::new(pb::SubscribeRequest { id });
                Self::with_metadata(&mut req, &headers);
                let call = if request.method == "tasks/subscribe" {
                    client.subscribe(req).await
                } else {
                    client.resubscribe(req).await
                };
                call.map_err(Self::map_status)?.into_inner()
            }
            other => {
                return Err(A2AError::CapabilityUnsupported(format!(
                    "gRPC transport has no streaming RPC for method '{other}'"
                )))
            }
        };

        let mapped = streaming.map(|item| {
            item.map_err(Self::map_status)
                .and_then(|resp| resp.try_into().map_err(A2AError::from))
        });
        Ok(SseStream::from_result_stream(mapped))
    }
}

fn send_message_response_from_event(
    event: crate::types::StreamResponse,
) -> A2AResult<SendMessageResponse> {
    match event {
        crate::types::StreamResponse::Task(task) => Ok(SendMessageResponse::Task(task)),
        crate::types::StreamResponse::Message(message) => Ok(SendMessageResponse::Message(message)),
        other => Err(A2AError::InvalidState(format!(
            "gRPC SendMessage returned a non-terminal event: {other:?}"
        ))),
    }
}
