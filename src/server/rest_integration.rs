//! REST (HTTP+JSON) integration — an alternate axum router speaking the
//! same operation set as [`super::axum_integration::a2a_router`] over plain
//! REST routes instead of a JSON-RPC envelope.
//!
//! Routes (per the A2A HTTP+JSON mapping):
//!
//! | Route | Operation |
//! |---|---|
//! | `POST /v1/message:send` | `message/send` |
//! | `POST /v1/message:stream` | `message/stream` |
//! | `GET /v1/tasks/{id}` | `tasks/get` |
//! | `POST /v1/tasks/{id}:cancel` | `tasks/cancel` |
//! | `GET /v1/tasks/{id}:subscribe` | `tasks/subscribe` |
//! | `POST /v1/tasks/{id}/pushNotificationConfigs` | `tasks/pushNotificationConfig/set` |
//! | `GET /v1/tasks/{id}/pushNotificationConfigs/{configId}` | `tasks/pushNotificationConfig/get` |
//! | `GET /v1/tasks/{id}/pushNotificationConfigs` | `tasks/pushNotificationConfig/list` |
//! | `DELETE /v1/tasks/{id}/pushNotificationConfigs/{configId}` | `tasks/pushNotificationConfig/delete` |
//! | `GET /v1/card` | agent card |
//!
//! This router shares the exact same [`RequestHandler`] dispatch core the
//! JSON-RPC router uses — only the wire envelope differs.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::error::A2AError;
use crate::types::{AgentCard, StreamResponse};

use super::request_handler::{
    CancelTaskParams, GetTaskParams, RequestHandler, SendMessageParams, SubscribeToTaskParams,
};

struct AppState {
    handler: Arc<dyn RequestHandler>,
    agent_card: AgentCard,
}

/// Build an axum `Router` speaking the REST (HTTP+JSON) binding.
///
/// Mountable alongside [`super::axum_integration::a2a_router`] — both share
/// the same `RequestHandler`, so a server can expose JSON-RPC and REST on
/// different mount points of one process without duplicating agent logic.
pub fn a2a_rest_router(handler: Arc<dyn RequestHandler>, agent_card: AgentCard) -> Router {
    let state = Arc::new(AppState {
        handler,
        agent_card,
    });

    Router::new()
        .route("/v1/message:send", post(handle_message_send))
        .route("/v1/message:stream", post(handle_message_stream))
        .route("/v1/tasks/{id}", get(handle_tasks_get))
        .route("/v1/tasks/{id}:cancel", post(handle_tasks_cancel))
        .route("/v1/tasks/{id}:subscribe", get(handle_tasks_subscribe))
        .route(
            "/v1/tasks/{id}/pushNotificationConfigs",
            post(handle_push_config_set).get(handle_push_config_list),
        )
        .route(
            "/v1/tasks/{id}/pushNotificationConfigs/{config_id}",
            get(handle_push_config_get).delete(handle_push_config_delete),
        )
        .route("/v1/card", get(handle_card))
        .with_state(state)
}

fn error_response(err: A2AError) -> Response {
    let status = match &err {
        A2AError::TaskNotFound { .. } => axum::http::StatusCode::NOT_FOUND,
        A2AError::InvalidParams { .. } | A2AError::InvalidArgs(_) => {
            axum::http::StatusCode::BAD_REQUEST
        }
        A2AError::TaskNotCancelable { .. } => axum::http::StatusCode::CONFLICT,
        A2AError::UnsupportedOperation { .. } | A2AError::CapabilityUnsupported(_) => {
            axum::http::StatusCode::NOT_IMPLEMENTED
        }
        _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

async fn handle_card(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(&state.agent_card)
}

async fn handle_message_send(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let params = match parse_send_message_params(body) {
        Ok(p) => p,
        Err(e) => return error_response(A2AError::InvalidArgs(e)),
    };
    match state.handler.on_message_send(params).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_message_stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    if !state.agent_card.capabilities.streaming.unwrap_or(false) {
        return error_response(A2AError::CapabilityUnsupported(
            "streaming is not supported by this agent".to_string(),
        ));
    }
    let params = match parse_send_message_params(body) {
        Ok(p) => p,
        Err(e) => return error_response(A2AError::InvalidArgs(e)),
    };
    match state.handler.on_message_send_stream(params).await {
        Ok(rx) => Sse::new(make_sse_stream(rx))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct HistoryLengthQuery {
    #[serde(rename = "historyLength")]
    history_length: Option<usize>,
}

async fn handle_tasks_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryLengthQuery>,
) -> Response {
    let params = GetTaskParams {
        id,
        history_length: query.history_length,
        metadata: None,
        tenant: None,
    };
    match state.handler.on_get_task(params).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_tasks_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let params = CancelTaskParams {
        id,
        metadata: None,
        tenant: None,
    };
    match state.handler.on_cancel_task(params).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_tasks_subscribe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let params = SubscribeToTaskParams {
        id,
        metadata: None,
        tenant: None,
    };
    match state.handler.on_subscribe_to_task(params).await {
        Ok(rx) => Sse::new(make_sse_stream(rx))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_push_config_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut body): Json<Value>,
) -> Response {
    if let Some(obj) = body.as_object_mut() {
        obj.entry("taskId").or_insert_with(|| Value::String(id));
    }
    match state
        .handler
        .on_set_task_push_notification_config(body)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_push_config_get(
    State(state): State<Arc<AppState>>,
    Path((id, config_id)): Path<(String, String)>,
) -> Response {
    let params = serde_json::json!({ "id": id, "pushNotificationConfigId": config_id });
    match state
        .handler
        .on_get_task_push_notification_config(params)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_push_config_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let params = serde_json::json!({ "id": id });
    match state
        .handler
        .on_list_task_push_notification_config(params)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_push_config_delete(
    State(state): State<Arc<AppState>>,
    Path((id, config_id)): Path<(String, String)>,
) -> Response {
    let params = serde_json::json!({ "id": id, "pushNotificationConfigId": config_id });
    match state
        .handler
        .on_delete_task_push_notification_config(params)
        .await
    {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

fn parse_send_message_params(body: Value) -> Result<SendMessageParams, String> {
    let obj = body.as_object().ok_or("request body must be an object")?;
    let message = serde_json::from_value(
        obj.get("message")
            .cloned()
            .ok_or("missing 'message' field")?,
    )
    .map_err(|e| format!("invalid message: {e}"))?;

    let configuration = obj
        .get("configuration")
        .filter(|v| !v.is_null())
        .cloned()
        .map(|v| serde_json::from_value(v).map_err(|e| format!("invalid configuration: {e}")))
        .transpose()?;

    let metadata = obj.get("metadata").filter(|v| !v.is_null()).cloned();
    let tenant = obj.get("tenant").and_then(|v| v.as_str().map(String::from));

    Ok(SendMessageParams {
        message,
        configuration,
        metadata,
        tenant,
    })
}

/// Emit one SSE frame per event, unwrapped — the REST mapping carries the
/// bare `StreamResponse` JSON rather than a JSON-RPC success envelope.
fn make_sse_stream(
    mut rx: broadcast::Receiver<StreamResponse>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let is_terminal = matches!(&event, StreamResponse::StatusUpdate(u) if u.r#final);
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().data(json)),
                        Err(e) => error!(error = %e, "failed to serialize REST SSE event"),
                    }
                    if is_terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "REST SSE stream lagged — some events were missed");
                }
            }
        }
    }
}
