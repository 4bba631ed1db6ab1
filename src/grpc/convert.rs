//! Conversions between `prost`-generated gRPC types and this crate's
//! `types.rs` structs.
//!
//! Every conversion here goes through `serde_json::Value` for the fields the
//! `.proto` schema carries as opaque JSON (`metadata_json`,
//! `configuration_json`, ...) — those fields exist so the gRPC binding never
//! has to duplicate a second hand-maintained schema for shapes `types.rs`
//! already owns authoritatively.

use crate::error::{A2AError, A2AResult};
use crate::types::{
    Artifact, FileContent, FileWithBytes, FileWithUri, Message, Part, PushNotificationConfig,
    Role, SendMessageParams, StreamResponse, Task, TaskArtifactUpdateEvent, TaskPushNotificationConfig,
    TaskState, TaskStatus, TaskStatusUpdateEvent,
};

use super::pb;

fn opt_json(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn parse_json(value: &str) -> A2AResult<serde_json::Value> {
    serde_json::from_str(value)
        .map_err(|e| A2AError::InvalidJson(format!("invalid JSON in gRPC payload: {e}")))
}

impl From<TaskState> for pb::TaskState {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Submitted => pb::TaskState::Submitted,
            TaskState::Working => pb::TaskState::Working,
            TaskState::Completed => pb::TaskState::Completed,
            TaskState::Failed => pb::TaskState::Failed,
            TaskState::Canceled => pb::TaskState::Canceled,
            TaskState::InputRequired => pb::TaskState::InputRequired,
            TaskState::Rejected => pb::TaskState::Rejected,
            TaskState::AuthRequired => pb::TaskState::AuthRequired,
            TaskState::Unknown => pb::TaskState::Unknown,
        }
    }
}

impl From<pb::TaskState> for TaskState {
    fn from(state: pb::TaskState) -> Self {
        match state {
            pb::TaskState::Submitted => TaskState::Submitted,
            pb::TaskState::Working => TaskState::Working,
            pb::TaskState::Completed => TaskState::Completed,
            pb::TaskState::Failed => TaskState::Failed,
            pb::TaskState::Canceled => TaskState::Canceled,
            pb::TaskState::InputRequired => TaskState::InputRequired,
            pb::TaskState::Rejected => TaskState::Rejected,
            pb::TaskState::AuthRequired => TaskState::AuthRequired,
            pb::TaskState::Unspecified | pb::TaskState::Unknown => TaskState::Unknown,
        }
    }
}

impl From<Role> for pb::Role {
    fn from(role: Role) -> Self {
        match role {
            Role::User => pb::Role::User,
            Role::Agent => pb::Role::Agent,
        }
    }
}

impl From<pb::Role> for Role {
    fn from(role: pb::Role) -> Self {
        match role {
            pb::Role::User | pb::Role::Unspecified => Role::User,
            pb::Role::Agent => Role::Agent,
        }
    }
}

impl From<Part> for pb::Part {
    fn from(part: Part) -> Self {
        let content = match part {
            Part::Text { text, .. } => pb::part::Content::Text(text),
            Part::File { file, .. } => pb::part::Content::File(match file {
                FileContent::Bytes(FileWithBytes {
                    bytes,
                    name,
                    mime_type,
                }) => pb::FilePart {
                    name: name.unwrap_or_default(),
                    mime_type: mime_type.unwrap_or_default(),
                    source: Some(pb::file_part::Source::Bytes(
                        base64_decode_best_effort(&bytes),
                    )),
                },
                FileContent::Uri(FileWithUri {
                    uri,
                    name,
                    mime_type,
                }) => pb::FilePart {
                    name: name.unwrap_or_default(),
                    mime_type: mime_type.unwrap_or_default(),
                    source: Some(pb::file_part::Source::Uri(uri)),
                },
            }),
            Part::Data { data, .. } => pb::part::Content::DataJson(data.to_string()),
        };
        pb::Part {
            content: Some(content),
        }
    }
}

impl TryFrom<pb::Part> for Part {
    type Error = A2AError;

    fn try_from(part: pb::Part) -> A2AResult<Self> {
        match part.content {
            Some(pb::part::Content::Text(text)) => Ok(Part::text(text)),
            Some(pb::part::Content::File(file)) => {
                let content = match file.source {
                    Some(pb::file_part::Source::Bytes(bytes)) => FileContent::Bytes(FileWithBytes {
                        bytes: base64_encode(&bytes),
                        name: non_empty(file.name),
                        mime_type: non_empty(file.mime_type),
                    }),
                    Some(pb::file_part::Source::Uri(uri)) => FileContent::Uri(FileWithUri {
                        uri,
                        name: non_empty(file.name),
                        mime_type: non_empty(file.mime_type),
                    }),
                    None => {
                        return Err(A2AError::InvalidJson(
                            "gRPC FilePart missing bytes/uri source".to_string(),
                        ))
                    }
                };
                Ok(Part::File {
                    file: content,
                    metadata: None,
                })
            }
            Some(pb::part::Content::DataJson(json)) => Ok(Part::Data {
                data: parse_json(&json)?,
                metadata: None,
            }),
            None => Err(A2AError::InvalidJson("gRPC Part has no content".to_string())),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode_best_effort(s: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .unwrap_or_default()
}

impl From<Message> for pb::Message {
    fn from(msg: Message) -> Self {
        pb::Message {
            message_id: msg.message_id,
            role: pb::Role::from(msg.role) as i32,
            parts: msg.parts.into_iter().map(Into::into).collect(),
            context_id: msg.context_id,
            task_id: msg.task_id,
            reference_task_ids: msg.reference_task_ids.unwrap_or_default(),
            metadata_json: opt_json(&msg.metadata),
            extensions: msg.extensions.unwrap_or_default(),
        }
    }
}

impl TryFrom<pb::Message> for Message {
    type Error = A2AError;

    fn try_from(msg: pb::Message) -> A2AResult<Self> {
        let parts = msg
            .parts
            .into_iter()
            .map(Part::try_from)
            .collect::<A2AResult<Vec<_>>>()?;
        Ok(Message {
            message_id: msg.message_id,
            role: pb::Role::try_from(msg.role).unwrap_or(pb::Role::User).into(),
            kind: "message".to_string(),
            parts,
            context_id: msg.context_id,
            task_id: msg.task_id,
            reference_task_ids: (!msg.reference_task_ids.is_empty()).then_some(msg.reference_task_ids),
            metadata: msg.metadata_json.as_deref().map(parse_json).transpose()?,
            extensions: (!msg.extensions.is_empty()).then_some(msg.extensions),
        })
    }
}

impl From<TaskStatus> for pb::TaskStatus {
    fn from(status: TaskStatus) -> Self {
        pb::TaskStatus {
            state: pb::TaskState::from(status.state) as i32,
            message: status.message.map(Into::into),
            timestamp: status.timestamp,
        }
    }
}

impl TryFrom<pb::TaskStatus> for TaskStatus {
    type Error = A2AError;

    fn try_from(status: pb::TaskStatus) -> A2AResult<Self> {
        Ok(TaskStatus {
            state: pb::TaskState::try_from(status.state)
                .unwrap_or(pb::TaskState::Unknown)
                .into(),
            message: status.message.map(Message::try_from).transpose()?,
            timestamp: status.timestamp,
        })
    }
}

impl From<Artifact> for pb::Artifact {
    fn from(artifact: Artifact) -> Self {
        pb::Artifact {
            artifact_id: artifact.artifact_id,
            name: artifact.name,
            description: artifact.description,
            parts: artifact.parts.into_iter().map(Into::into).collect(),
            metadata_json: opt_json(&artifact.metadata),
            extensions: artifact.extensions.unwrap_or_default(),
        }
    }
}

impl TryFrom<pb::Artifact> for Artifact {
    type Error = A2AError;

    fn try_from(artifact: pb::Artifact) -> A2AResult<Self> {
        let parts = artifact
            .parts
            .into_iter()
            .map(Part::try_from)
            .collect::<A2AResult<Vec<_>>>()?;
        Ok(Artifact {
            artifact_id: artifact.artifact_id,
            name: artifact.name,
            description: artifact.description,
            parts,
            metadata: artifact.metadata_json.as_deref().map(parse_json).transpose()?,
            extensions: (!artifact.extensions.is_empty()).then_some(artifact.extensions),
        })
    }
}

impl From<Task> for pb::Task {
    fn from(task: Task) -> Self {
        pb::Task {
            id: task.id,
            context_id: task.context_id,
            status: Some(task.status.into()),
            artifacts: task
                .artifacts
                .unwrap_or_default()
                .into_iter()
                .map(Into::into)
                .collect(),
            history: task
                .history
                .unwrap_or_default()
                .into_iter()
                .map(Into::into)
                .collect(),
            metadata_json: opt_json(&task.metadata),
        }
    }
}

impl TryFrom<pb::Task> for Task {
    type Error = A2AError;

    fn try_from(task: pb::Task) -> A2AResult<Self> {
        let status = task
            .status
            .ok_or_else(|| A2AError::InvalidJson("gRPC Task missing status".to_string()))?
            .try_into()?;
        let artifacts = task
            .artifacts
            .into_iter()
            .map(Artifact::try_from)
            .collect::<A2AResult<Vec<_>>>()?;
        let history = task
            .history
            .into_iter()
            .map(Message::try_from)
            .collect::<A2AResult<Vec<_>>>()?;
        Ok(Task {
            id: task.id,
            context_id: task.context_id,
            kind: "task".to_string(),
            status,
            artifacts: (!artifacts.is_empty()).then_some(artifacts),
            history: (!history.is_empty()).then_some(history),
            metadata: task.metadata_json.as_deref().map(parse_json).transpose()?,
        })
    }
}

impl From<TaskStatusUpdateEvent> for pb::TaskStatusUpdateEvent {
    fn from(ev: TaskStatusUpdateEvent) -> Self {
        pb::TaskStatusUpdateEvent {
            task_id: ev.task_id,
            context_id: ev.context_id,
            status: Some(ev.status.into()),
            r#final: ev.r#final,
            metadata_json: opt_json(&ev.metadata),
        }
    }
}

impl TryFrom<pb::TaskStatusUpdateEvent> for TaskStatusUpdateEvent {
    type Error = A2AError;

    fn try_from(ev: pb::TaskStatusUpdateEvent) -> A2AResult<Self> {
        Ok(TaskStatusUpdateEvent {
            task_id: ev.task_id,
            context_id: ev.context_id,
            kind: "status-update".to_string(),
            status: ev
                .status
                .ok_or_else(|| A2AError::InvalidJson("gRPC status-update missing status".to_string()))?
                .try_into()?,
            r#final: ev.r#final,
            metadata: ev.metadata_json.as_deref().map(parse_json).transpose()?,
        })
    }
}

impl From<TaskArtifactUpdateEvent> for pb::TaskArtifactUpdateEvent {
    fn from(ev: TaskArtifactUpdateEvent) -> Self {
        pb::TaskArtifactUpdateEvent {
            task_id: ev.task_id,
            context_id: ev.context_id,
            artifact: Some(ev.artifact.into()),
            append: ev.append,
            last_chunk: ev.last_chunk,
            metadata_json: opt_json(&ev.metadata),
        }
    }
}

impl TryFrom<pb::TaskArtifactUpdateEvent> for TaskArtifactUpdateEvent {
    type Error = A2AError;

    fn try_from(ev: pb::TaskArtifactUpdateEvent) -> A2AResult<Self> {
        Ok(TaskArtifactUpdateEvent {
            task_id: ev.task_id,
            context_id: ev.context_id,
            kind: "artifact-update".to_string(),
            artifact: ev
                .artifact
                .ok_or_else(|| A2AError::InvalidJson("gRPC artifact-update missing artifact".to_string()))?
                .try_into()?,
            append: ev.append,
            last_chunk: ev.last_chunk,
            metadata: ev.metadata_json.as_deref().map(parse_json).transpose()?,
        })
    }
}

impl From<StreamResponse> for pb::StreamResponse {
    fn from(event: StreamResponse) -> Self {
        let payload = match event {
            StreamResponse::Task(t) => pb::stream_response::Payload::Task(t.into()),
            StreamResponse::Message(m) => pb::stream_response::Payload::Message(m.into()),
            StreamResponse::StatusUpdate(ev) => {
                pb::stream_response::Payload::StatusUpdate(ev.into())
            }
            StreamResponse::ArtifactUpdate(ev) => {
                pb::stream_response::Payload::ArtifactUpdate(ev.into())
            }
        };
        pb::StreamResponse {
            payload: Some(payload),
        }
    }
}

impl TryFrom<pb::StreamResponse> for StreamResponse {
    type Error = A2AError;

    fn try_from(event: pb::StreamResponse) -> A2AResult<Self> {
        match event.payload {
            Some(pb::stream_response::Payload::Task(t)) => Ok(StreamResponse::Task(t.try_into()?)),
            Some(pb::stream_response::Payload::Message(m)) => {
                Ok(StreamResponse::Message(m.try_into()?))
            }
            Some(pb::stream_response::Payload::StatusUpdate(ev)) => {
                Ok(StreamResponse::StatusUpdate(ev.try_into()?))
            }
            Some(pb::stream_response::Payload::ArtifactUpdate(ev)) => {
                Ok(StreamResponse::ArtifactUpdate(ev.try_into()?))
            }
            None => Err(A2AError::InvalidJson(
                "gRPC StreamResponse has no payload".to_string(),
            )),
        }
    }
}

/// Build a `SendMessageRequest` from the uniform `SendMessageParams` every
/// binding shares — `configuration`/`metadata` ride as opaque JSON, same as
/// everywhere else in this module, since the `.proto` schema never models
/// them as first-class messages.
pub fn send_message_request(params: SendMessageParams) -> A2AResult<pb::SendMessageRequest> {
    let configuration_json = params
        .configuration
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| A2AError::InvalidJson(e.to_string()))?;
    Ok(pb::SendMessageRequest {
        message: Some(params.message.into()),
        configuration_json,
        metadata_json: opt_json(&params.metadata),
        tenant: params.tenant,
    })
}

/// Parse a `SendMessageRequest` back into `SendMessageParams`, the server side
/// of [`send_message_request`].
pub fn send_message_params(request: pb::SendMessageRequest) -> A2AResult<SendMessageParams> {
    let message = request
        .message
        .ok_or_else(|| A2AError::InvalidJson("gRPC SendMessageRequest missing message".to_string()))?
        .try_into()?;
    let configuration = request
        .configuration_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e: serde_json::Error| A2AError::InvalidJson(e.to_string()))?;
    Ok(SendMessageParams {
        message,
        configuration,
        metadata: request.metadata_json.as_deref().map(parse_json).transpose()?,
        tenant: request.tenant,
    })
}

/// Convert a gRPC `TaskPushNotificationConfig` (config carried as JSON) into
/// the crate's typed equivalent.
pub fn task_push_notification_config_from_pb(
    cfg: pb::TaskPushNotificationConfig,
) -> A2AResult<TaskPushNotificationConfig> {
    let push_notification_config: PushNotificationConfig =
        serde_json::from_str(&cfg.push_notification_config_json).map_err(|e| {
            A2AError::InvalidJson(format!("invalid pushNotificationConfig JSON from gRPC: {e}"))
        })?;
    Ok(TaskPushNotificationConfig {
        id: cfg.id,
        task_id: cfg.task_id,
        push_notification_config,
        tenant: None,
    })
}

/// Convert a typed `TaskPushNotificationConfig` into its gRPC wire shape.
pub fn task_push_notification_config_to_pb(
    cfg: TaskPushNotificationConfig,
) -> A2AResult<pb::TaskPushNotificationConfig> {
    let push_notification_config_json = serde_json::to_string(&cfg.push_notification_config)
        .map_err(|e| A2AError::InvalidJson(e.to_string()))?;
    Ok(pb::TaskPushNotificationConfig {
        id: cfg.id,
        task_id: cfg.task_id,
        push_notification_config_json,
    })
}
