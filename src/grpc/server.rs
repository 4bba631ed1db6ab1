//! gRPC server: `A2aService` implemented directly against [`RequestHandler`],
//! the same trait `a2a_router`/`a2a_rest_router` dispatch into. Only the wire
//! envelope differs — request parsing and SSE-vs-gRPC-stream framing.

use std::pin::Pin;

use futures::Stream;
use tokio::sync::broadcast;
use tonic::{Request, Response, Status};
use tracing::{error, warn};

use crate::error::A2AError;
use crate::types::{AgentCard, StreamResponse};

use super::convert;
use super::pb;
use pb::a2a_service_server::A2aService;

use crate::server::request_handler::{
    CancelTaskParams, GetTaskParams, RequestHandler, SendMessageConfiguration, SendMessageParams,
    SubscribeToTaskParams,
};

/// Tonic service implementation backed by an `Arc<dyn RequestHandler>`.
///
/// Constructed with [`pb::a2a_service_server::A2aServiceServer::new`] and
/// added to a `tonic::transport::Server` the same way `a2a_router`'s `Router`
/// is added to an axum server — this type is the gRPC counterpart of
/// [`super::super::server::axum_integration::a2a_router`].
pub struct A2AGrpcService {
    handler: std::sync::Arc<dyn RequestHandler>,
    agent_card: AgentCard,
}

impl A2AGrpcService {
    /// Build the service from a request handler and the agent card served by
    /// `GetAgentCard`.
    pub fn new(handler: std::sync::Arc<dyn RequestHandler>, agent_card: AgentCard) -> Self {
        Self { handler, agent_card }
    }
}

fn status_from_a2a_error(err: A2AError) -> Status {
    match &err {
        A2AError::TaskNotFound { message, .. } => Status::not_found(message.clone()),
        A2AError::TaskNotCancelable { message, .. } => Status::failed_precondition(message.clone()),
        A2AError::InvalidParams { message, .. } => Status::invalid_argument(message.clone()),
        A2AError::InvalidArgs(message) => Status::invalid_argument(message.clone()),
        A2AError::UnsupportedOperation { message, .. } | A2AError::CapabilityUnsupported(message) => {
            Status::unimplemented(message.clone())
        }
        A2AError::Timeout(message) => Status::deadline_exceeded(message.clone()),
        other => Status::internal(other.to_string()),
    }
}

type EventStream = Pin<Box<dyn Stream<Item = Result<pb::StreamResponse, Status>> + Send>>;

/// Turn a task's broadcast receiver into a gRPC server-streaming response,
/// closing the stream after the first terminal event — the gRPC counterpart
/// of `axum_integration::make_sse_stream`.
fn grpc_event_stream(mut rx: broadcast::Receiver<StreamResponse>) -> EventStream {
    Box::pin(async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let is_final = matches!(&event, StreamResponse::StatusUpdate(u) if u.r#final);
                    let is_message = matches!(&event, StreamResponse::Message(_));
                    match pb::StreamResponse::try_from(event) {
                        Ok(frame) => yield Ok(frame),
                        Err(e) => {
                            error!(error = %e, "failed to convert event to gRPC frame");
                            yield Err(Status::internal(e.to_string()));
                            break;
                        }
                    }
                    if is_final || is_message {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "gRPC event stream lagged — some events were missed");
                }
            }
        }
    })
}

#[tonic::async_trait]
impl A2aService for A2AGrpcService {
    async fn send_message(
        &self,
        request: Request<pb::SendMessageRequest>,
    ) -> Result<Response<pb::StreamResponse>, Status> {
        let params = translate_send_message_params(request.into_inner()).map_err(status_from_a2a_error)?;
        let response = self
            .handler
            .on_message_send(params)
            .await
            .map_err(status_from_a2a_error)?;
        let event = match response {
            crate::types::SendMessageResponse::Task(t) => StreamResponse::Task(t),
            crate::types::SendMessageResponse::Message(m) => StreamResponse::Message(m),
        };
        let frame = pb::StreamResponse::try_from(event).map_err(status_from_a2a_error)?;
        Ok(Response::new(frame))
    }

    type SendMessageStreamStream = EventStream;

    async fn send_message_stream(
        &self,
        request: Request<pb::SendMessageRequest>,
    ) -> Result<Response<Self::SendMessageStreamStream>, Status> {
        let params = translate_send_message_params(request.into_inner()).map_err(status_from_a2a_error)?;
        let rx = self
            .handler
            .on_message_send_stream(params)
            .await
            .map_err(status_from_a2a_error)?;
        Ok(Response::new(grpc_event_stream(rx)))
    }

    async fn get_task(
        &self,
        request: Request<pb::GetTaskRequest>,
    ) -> Result<Response<pb::Task>, Status> {
        let req = request.into_inner();
        let params = GetTaskParams {
            id: req.id,
            history_length: req.history_length.map(|n| n.max(0) as usize),
            metadata: None,
            tenant: req.tenant,
        };
        let task = self
            .handler
            .on_get_task(params)
            .await
            .map_err(status_from_a2a_error)?;
        Ok(Response::new(task.into()))
    }

    async fn cancel_task(
        &self,
        request: Request<pb::CancelTaskRequest>,
    ) -> Result<Response<pb::Task>, Status> {
        let req = request.into_inner();
        let params = CancelTaskParams {
            id: req.id,
            metadata: None,
            tenant: req.tenant,
        };
        let task = self
            .handler
            .on_cancel_task(params)
            .await
            .map_err(status_from_a2a_error)?;
        Ok(Response::new(task.into()))
    }

    type SubscribeStream = EventStream;

    async fn subscribe(
        &self,
        request: Request<pb::SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let params = SubscribeToTaskParams {
            id: request.into_inner().id,
            metadata: None,
            tenant: None,
        };
        let rx = self
            .handler
            .on_subscribe_to_task(params)
            .await
            .map_err(status_from_a2a_error)?;
        Ok(Response::new(grpc_event_stream(rx)))
    }

    type ResubscribeStream = EventStream;

    async fn resubscribe(
        &self,
        request: Request<pb::SubscribeRequest>,
    ) -> Result<Response<Self::ResubscribeStream>, Status> {
        let params = SubscribeToTaskParams {
            id: request.into_inner().id,
            metadata: None,
            tenant: None,
        };
        let rx = self
            .handler
            .on_resubscribe_to_task(params)
            .await
            .map_err(status_from_a2a_error)?;
        Ok(Response::new(grpc_event_stream(rx)))
    }

    async fn set_task_push_notification_config(
        &self,
        request: Request<pb::SetTaskPushNotificationConfigRequest>,
    ) -> Result<Response<pb::TaskPushNotificationConfig>, Status> {
        let req = request.into_inner();
        let config: crate::types::PushNotificationConfig = serde_json::from_str(&req.config_json)
            .map_err(|e| Status::invalid_argument(format!("invalid config_json: {e}")))?;
        let params = serde_json::json!({
            "taskId": req.task_id,
            "configId": req.config_id,
            "config": config,
        });
        let result = self
            .handler
            .on_set_task_push_notification_config(params)
            .await
            .map_err(status_from_a2a_error)?;
        let cfg: crate::types::TaskPushNotificationConfig =
            serde_json::from_value(result).map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(
            convert::task_push_notification_config_to_pb(cfg).map_err(status_from_a2a_error)?,
        ))
    }

    async fn get_task_push_notification_config(
        &self,
        request: Request<pb::GetTaskPushNotificationConfigRequest>,
    ) -> Result<Response<pb::TaskPushNotificationConfig>, Status> {
        let req = request.into_inner();
        let params = serde_json::json!({
            "id": req.id,
            "pushNotificationConfigId": req.push_notification_config_id,
        });
        let result = self
            .handler
            .on_get_task_push_notification_config(params)
            .await
            .map_err(status_from_a2a_error)?;
        let cfg: crate::types::TaskPushNotificationConfig =
            serde_json::from_value(result).map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(
            convert::task_push_notification_config_to_pb(cfg).map_err(status_from_a2a_error)?,
        ))
    }

    async fn list_task_push_notification_config(
        &self,
        request: Request<pb::ListTaskPushNotificationConfigRequest>,
    ) -> Result<Response<pb::ListTaskPushNotificationConfigResponse>, Status> {
        let params = serde_json::json!({ "id": request.into_inner().id });
        let result = self
            .handler
            .on_list_task_push_notification_config(params)
            .await
            .map_err(status_from_a2a_error)?;
        let response: crate::types::ListTaskPushNotificationConfigResponse =
            serde_json::from_value(result).map_err(|e| Status::internal(e.to_string()))?;
        let configs = response
            .configs
            .into_iter()
            .map(convert::task_push_notification_config_to_pb)
            .collect::<Result<Vec<_>, _>>()
            .map_err(status_from_a2a_error)?;
        Ok(Response::new(pb::ListTaskPushNotificationConfigResponse { configs }))
    }

    async fn delete_task_push_notification_config(
        &self,
        request: Request<pb::DeleteTaskPushNotificationConfigRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        let params = serde_json::json!({
            "id": req.id,
            "pushNotificationConfigId": req.push_notification_config_id,
        });
        self.handler
            .on_delete_task_push_notification_config(params)
            .await
            .map_err(status_from_a2a_error)?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn get_agent_card(
        &self,
        _request: Request<pb::AgentCardRequest>,
    ) -> Result<Response<pb::AgentCardResponse>, Status> {
        let card_json = serde_json::to_string(&self.agent_card)
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(pb::AgentCardResponse { card_json }))
    }
}

fn translate_send_message_params(
    req: pb::SendMessageRequest,
) -> Result<SendMessageParams, A2AError> {
    let params = convert::send_message_params(req)?;
    let configuration = params
        .configuration
        .map(|c| -> Result<SendMessageConfiguration, A2AError> {
            Ok(SendMessageConfiguration {
                accepted_output_modes: c.accepted_output_modes,
                blocking: c.blocking,
                history_length: c.history_length.map(|n| n.max(0) as usize),
                push_notification_config: c
                    .push_notification_config
                    .map(|cfg| serde_json::to_value(cfg).map_err(A2AError::from))
                    .transpose()?,
            })
        })
        .transpose()?;
    Ok(SendMessageParams {
        message: params.message,
        configuration,
        metadata: params.metadata,
        tenant: params.tenant,
    })
}
