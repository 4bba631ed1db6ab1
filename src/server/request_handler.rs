//! Request handler — coordinates agent execution, task storage, and event delivery.
//!
//! Mirrors Python SDK's `RequestHandler(ABC)` and `DefaultRequestHandler` from
//! `a2a.server.request_handlers`.
//!
//! The [`RequestHandler`] trait defines the interface that the axum integration
//! layer calls for each JSON-RPC method. [`DefaultRequestHandler`] provides
//! the standard implementation that wires together an [`AgentExecutor`],
//! [`TaskStore`], and [`EventQueue`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{A2AError, A2AResult};
use crate::fold::{is_terminal, FoldStep, TaskFold};
use crate::types::{
    Message, Part, SendMessageResponse, StreamResponse, Task, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};

use super::agent_executor::{AgentExecutor, RequestContext};
use super::event_queue::{EventQueue, InMemoryQueueManager, QueueManager};
use super::push_notification_store::PushNotificationConfigStore;
use super::push_notifier::PushNotificationSender;
use super::task_store::{TaskListParams, TaskListResponse, TaskStore};

/// Parameters for `message/send` and `message/stream`.
#[derive(Debug, Clone)]
pub struct SendMessageParams {
    /// The message to send to the agent.
    pub message: Message,

    /// Optional configuration for the send operation.
    pub configuration: Option<SendMessageConfiguration>,

    /// Optional metadata attached to the request.
    pub metadata: Option<serde_json::Value>,

    /// Optional tenant identifier.
    pub tenant: Option<String>,
}

/// Configuration options for message sending.
#[derive(Debug, Clone)]
pub struct SendMessageConfiguration {
    /// Accepted output MIME types / modes.
    pub accepted_output_modes: Option<Vec<String>>,

    /// If `true`, the server should block until the task completes.
    /// If `false` or `None`, the server may return immediately with a
    /// `submitted` or `working` task.
    pub blocking: Option<bool>,

    /// Maximum number of history messages to include in the response.
    pub history_length: Option<usize>,

    /// Push notification configuration.
    pub push_notification_config: Option<serde_json::Value>,
}

/// Parameters for `tasks/get`.
#[derive(Debug, Clone)]
pub struct GetTaskParams {
    /// The task ID to retrieve.
    pub id: String,

    /// Maximum number of history messages to include.
    pub history_length: Option<usize>,

    /// Optional metadata.
    pub metadata: Option<serde_json::Value>,

    /// Optional tenant identifier.
    pub tenant: Option<String>,
}

/// Parameters for `tasks/cancel`.
#[derive(Debug, Clone)]
pub struct CancelTaskParams {
    /// The task ID to cancel.
    pub id: String,

    /// Optional metadata.
    pub metadata: Option<serde_json::Value>,

    /// Optional tenant identifier.
    pub tenant: Option<String>,
}

/// Parameters for `tasks/subscribe`.
#[derive(Debug, Clone)]
pub struct SubscribeToTaskParams {
    /// The task ID to subscribe to.
    pub id: String,

    /// Optional metadata.
    pub metadata: Option<serde_json::Value>,

    /// Optional tenant identifier.
    pub tenant: Option<String>,
}

// Re-export from types.rs — uses proto oneof serialization pattern.
// SendMessageResponse is imported from crate::types above.

/// Trait for handling A2A JSON-RPC requests.
///
/// Each method corresponds to an A2A JSON-RPC method. The axum integration
/// layer dispatches incoming requests to these methods.
///
/// Mirrors Python SDK's `RequestHandler(ABC)` from
/// `a2a.server.request_handlers.request_handler`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle `message/send` — execute agent logic and return the completed task or message.
    async fn on_message_send(&self, params: SendMessageParams) -> A2AResult<SendMessageResponse>;

    /// Handle `message/stream` — execute agent logic and return an event stream.
    async fn on_message_send_stream(
        &self,
        params: SendMessageParams,
    ) -> A2AResult<broadcast::Receiver<StreamResponse>>;

    /// Handle `tasks/get` — retrieve a task by ID.
    async fn on_get_task(&self, params: GetTaskParams) -> A2AResult<Task>;

    /// Handle `tasks/list` — list tasks matching filter criteria.
    async fn on_list_tasks(&self, params: TaskListParams) -> A2AResult<TaskListResponse>;

    /// Handle `tasks/cancel` — cancel a running task.
    async fn on_cancel_task(&self, params: CancelTaskParams) -> A2AResult<Task>;

    /// Handle `tasks/resubscribe` — re-subscribe to events for a running task.
    ///
    /// Allows a client to re-attach to a running streaming task's event stream.
    /// Default implementation returns `UnsupportedOperation`.
    async fn on_resubscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<broadcast::Receiver<StreamResponse>> {
        let _ = params;
        Err(A2AError::UnsupportedOperation {
            message: "tasks/resubscribe is not supported".to_string(),
            data: None,
        })
    }

    /// Handle `tasks/subscribe` — subscribe to events for an existing task.
    async fn on_subscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<broadcast::Receiver<StreamResponse>>;

    /// Handle `tasks/pushNotificationConfig/set`.
    ///
    /// Default implementation returns `UnsupportedOperation`.
    async fn on_set_task_push_notification_config(
        &self,
        _params: serde_json::Value,
    ) -> A2AResult<serde_json::Value> {
        Err(A2AError::UnsupportedOperation {
            message: "Push notification config is not supported".to_string(),
            data: None,
        })
    }

    /// Handle `tasks/pushNotificationConfig/get`.
    ///
    /// Default implementation returns `UnsupportedOperation`.
    async fn on_get_task_push_notification_config(
        &self,
        _params: serde_json::Value,
    ) -> A2AResult<serde_json::Value> {
        Err(A2AError::UnsupportedOperation {
            message: "Push notification config is not supported".to_string(),
            data: None,
        })
    }

    /// Handle `tasks/pushNotificationConfig/list`.
    ///
    /// Default implementation returns `UnsupportedOperation`.
    async fn on_list_task_push_notification_config(
        &self,
        _params: serde_json::Value,
    ) -> A2AResult<serde_json::Value> {
        Err(A2AError::UnsupportedOperation {
            message: "Push notification config is not supported".to_string(),
            data: None,
        })
    }

    /// Handle `tasks/pushNotificationConfig/delete`.
    ///
    /// Default implementation returns `UnsupportedOperation`.
    async fn on_delete_task_push_notification_config(
        &self,
        _params: serde_json::Value,
    ) -> A2AResult<()> {
        Err(A2AError::UnsupportedOperation {
            message: "Push notification config is not supported".to_string(),
            data: None,
        })
    }
}

/// Tracks a running agent execution. This is purely a producer-handle
/// registry (for `abort()` on cancel) — the event queue itself lives in
/// `queue_manager`, the single source of truth for per-task queues.
struct RunningAgent {
    /// Handle to the spawned tokio task running the agent.
    handle: JoinHandle<()>,
}

/// Default request handler — standard implementation wiring executor, store, and events.
///
/// This is the primary implementation of [`RequestHandler`] that coordinates:
/// - An [`AgentExecutor`] for running agent logic
/// - A [`TaskStore`] for persisting task state
/// - An [`EventQueue`] per task for streaming events
///
/// # Lifecycle
///
/// 1. `on_message_send` or `on_message_send_stream` creates a new task (or looks up
///    an existing one by context ID), persists it, and spawns the agent executor.
/// 2. The executor publishes events to the task's `EventQueue`.
/// 3. For `message/send`: events are consumed until a terminal state, then the
///    final task is returned.
/// 4. For `message/stream`: the event receiver is returned directly for SSE delivery.
/// 5. `on_cancel_task` calls the executor's cancel method and waits for the
///    cancellation event.
pub struct DefaultRequestHandler {
    executor: Arc<dyn AgentExecutor>,
    task_store: Arc<dyn TaskStore>,
    /// The single source of truth for per-task event queues (create/tap/close).
    queue_manager: Arc<dyn QueueManager>,
    /// Running agent producer handles, keyed by task ID — used only to
    /// `abort()` a producer task on cancel.
    running_agents: Mutex<HashMap<String, RunningAgent>>,
    /// Optional push-notification config store (spec §4.5 step 3, §6).
    push_config_store: Option<Arc<dyn PushNotificationConfigStore>>,
    /// Optional push-notification sender (spec §4.5 step 7, §4.8).
    push_sender: Option<Arc<dyn PushNotificationSender>>,
}

impl DefaultRequestHandler {
    /// Create a new default request handler backed by an in-memory queue manager.
    pub fn new(executor: Arc<dyn AgentExecutor>, task_store: Arc<dyn TaskStore>) -> Self {
        Self::with_queue_manager(executor, task_store, Arc::new(InMemoryQueueManager::new()))
    }

    /// Create a new default request handler with an explicit [`QueueManager`]
    /// (e.g. a distributed implementation for multi-instance deployments).
    pub fn with_queue_manager(
        executor: Arc<dyn AgentExecutor>,
        task_store: Arc<dyn TaskStore>,
        queue_manager: Arc<dyn QueueManager>,
    ) -> Self {
        Self {
            executor,
            task_store,
            queue_manager,
            running_agents: Mutex::new(HashMap::new()),
            push_config_store: None,
            push_sender: None,
        }
    }

    /// Attach a push-notification config store (builder-style).
    ///
    /// Without one, `tasks/pushNotificationConfig/*` requests return
    /// `UnsupportedOperation` (`-32601`), matching the default trait methods.
    pub fn with_push_notification_config_store(
        mut self,
        store: Arc<dyn PushNotificationConfigStore>,
    ) -> Self {
        self.push_config_store = Some(store);
        self
    }

    /// Attach a push-notification sender (builder-style).
    ///
    /// Without one, a configured push config store still records callbacks
    /// but no delivery is attempted.
    pub fn with_push_notification_sender(mut self, sender: Arc<dyn PushNotificationSender>) -> Self {
        self.push_sender = Some(sender);
        self
    }

    /// Best-effort: deliver the current task snapshot to every push
    /// notification callback registered for it (spec §4.5 step 7).
    /// No-op unless both a config store and a sender are configured.
    async fn notify_push(&self, task: &Task) {
        deliver_push_notifications_for_task(&self.push_config_store, &self.push_sender, task).await;
    }

    /// Associate the configuration's `push_notification_config`, if any, with
    /// the task (spec §4.5 step 3).
    async fn register_push_config(&self, task_id: &str, configuration: Option<&SendMessageConfiguration>) {
        let Some(store) = &self.push_config_store else {
            return;
        };
        let Some(config_value) = configuration.and_then(|c| c.push_notification_config.clone())
        else {
            return;
        };
        let config: crate::types::PushNotificationConfig = match serde_json::from_value(config_value)
        {
            Ok(c) => c,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Invalid push_notification_config in send-message configuration");
                return;
            }
        };
        if let Err(e) = store.save(task_id, config).await {
            warn!(task_id = %task_id, error = %e, "Failed to save push notification config");
        }
    }

    /// Return the task's event queue, creating and registering one if this
    /// is the first producer for the task (mirrors Python SDK's
    /// `_register_producer` queue acquisition via `QueueManager`).
    async fn producer_queue(&self, task_id: &str) -> EventQueue {
        if let Some(existing) = self.queue_manager.get(task_id).await {
            return existing;
        }
        let queue = EventQueue::with_default_capacity();
        // Another caller may have raced us to `add` — fall back to `get`.
        if self.queue_manager.add(task_id, queue.clone()).await.is_err() {
            if let Some(existing) = self.queue_manager.get(task_id).await {
                return existing;
            }
        }
        queue
    }

    /// Create or retrieve a task for the given message.
    ///
    /// Mirrors Python SDK's `_setup_message_execution` task resolution logic:
    /// 1. If `task_id` is set, look up the existing task and validate state.
    /// 2. If the task exists but is terminal, return `InvalidParams`.
    /// 3. If `task_id` is set but doesn't exist, return `TaskNotFound`.
    /// 4. Otherwise create a new task in `submitted` state.
    async fn get_or_create_task(&self, params: &SendMessageParams) -> A2AResult<Task> {
        // Check if the message references an existing task.
        if let Some(ref task_id) = params.message.task_id {
            if let Some(task) = self.task_store.get(task_id).await? {
                // Verify it's not in a terminal state (mirrors Python SDK check).
                if Self::is_terminal(&task.status.state) {
                    return Err(A2AError::InvalidParams {
                        message: format!(
                            "Task {} is in terminal state: {}",
                            task_id, task.status.state
                        ),
                        data: None,
                    });
                }
                // Add the new message to history (mirrors Python's update_with_message).
                // Python SDK moves status.message to history first, then clears it.
                let mut updated_task = task;
                if let Some(ref status_msg) = updated_task.status.message {
                    let history = updated_task.history.get_or_insert_with(Vec::new);
                    history.push(status_msg.clone());
                    updated_task.status.message = None;
                }
                let history = updated_task.history.get_or_insert_with(Vec::new);
                history.push(params.message.clone());
                self.task_store.save(updated_task.clone()).await?;
                return Ok(updated_task);
            } else {
                // task_id was specified but doesn't exist (mirrors Python SDK).
                return Err(A2AError::TaskNotFound {
                    message: format!("Task {} was specified but does not exist", task_id),
                    data: None,
                });
            }
        }

        // Create a new task.
        let task_id = Uuid::new_v4().to_string();
        let context_id = params
            .message
            .context_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let task = Task {
            id: task_id,
            context_id,
            kind: "task".to_string(),
            status: TaskStatus {
                state: TaskState::Submitted,
                message: None,
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
            },
            artifacts: None,
            history: Some(vec![params.message.clone()]),
            metadata: params.metadata.clone(),
        };

        self.task_store.save(task.clone()).await?;
        debug!(task_id = %task.id, "Created new task");

        Ok(task)
    }

    /// Spawn the agent executor for a task.
    ///
    /// Returns the event queue for subscribing to events.
    ///
    /// Mirrors Python SDK's `_run_event_stream` — executes the agent and closes
    /// the queue afterwards. Does NOT auto-publish a `Working` status; that is
    /// the responsibility of the `AgentExecutor` implementation (matching the
    /// Python SDK where `_run_event_stream` just calls `execute` + `close`).
    async fn spawn_executor(
        &self,
        task: &Task,
        message: &Message,
        configuration: Option<&SendMessageConfiguration>,
    ) -> A2AResult<EventQueue> {
        self.register_push_config(&task.id, configuration).await;

        let event_queue = self.producer_queue(&task.id).await;

        // Convert the request_handler's SendMessageConfiguration to the
        // types.rs SendMessageConfiguration used by RequestContext.
        let types_config = configuration.map(|c| crate::types::SendMessageConfiguration {
            accepted_output_modes: c.accepted_output_modes.clone(),
            push_notification_config: c
                .push_notification_config
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            history_length: c.history_length.map(|h| h as i32),
            blocking: c.blocking,
        });

        let context = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message: Some(message.clone()),
            task: Some(task.clone()),
            configuration: types_config,
            related_tasks: Vec::new(),
            metadata: task.metadata.clone(),
            call_context: None,
        };

        let executor = Arc::clone(&self.executor);
        let queue_clone = event_queue.clone();
        let task_id = task.id.clone();
        let context_id = task.context_id.clone();

        let handle = tokio::spawn(async move {
            // Execute the agent — state transitions (working, etc.) are the
            // agent's responsibility, matching the Python SDK pattern.
            if let Err(e) = executor.execute(context, queue_clone.clone()).await {
                error!(task_id = %task_id, error = %e, "Agent execution failed");

                // Publish a failed status (matches Python SDK behavior where
                // execution errors result in a failed task).
                let failed_event = StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
                    task_id: task_id.clone(),
                    context_id: context_id.clone(),
                    kind: "status-update".to_string(),
                    status: TaskStatus {
                        state: TaskState::Failed,
                        message: Some(Message {
                            message_id: Uuid::new_v4().to_string(),
                            role: crate::types::Role::Agent,
                            kind: "message".to_string(),
                            parts: vec![Part::text(format!("Agent execution failed: {}", e))],
                            context_id: None,
                            task_id: Some(task_id.clone()),
                            metadata: None,
                            extensions: None,
                            reference_task_ids: None,
                        }),
                        timestamp: Some(chrono::Utc::now().to_rfc3339()),
                    },
                    r#final: true,
                    metadata: None,
                });
                let _ = queue_clone.publish(failed_event);
            }
            // Note: Python SDK calls queue.close() here. Our broadcast channel
            // auto-closes when all senders are dropped, achieving the same effect.
        });

        // Track the running agent (mirrors Python's _register_producer).
        let mut running = self.running_agents.lock().await;
        running.insert(task.id.clone(), RunningAgent { handle });

        Ok(event_queue)
    }

    /// Consume events from the queue until a terminal state is reached.
    ///
    /// Updates the task in the store as events arrive. Returns the final task.
    async fn consume_until_terminal(
        &self,
        task_id: &str,
        mut rx: broadcast::Receiver<StreamResponse>,
    ) -> A2AResult<Task> {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.apply_event(task_id, &event).await?;

                    if let StreamResponse::StatusUpdate(ref update) = event {
                        if Self::is_terminal(&update.status.state) || update.r#final {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // Channel closed — agent is done.
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(task_id = %task_id, missed = n, "Event consumer lagged");
                    // Continue receiving.
                }
            }
        }

        // Clean up the running agent entry and release the queue.
        {
            let mut running = self.running_agents.lock().await;
            running.remove(task_id);
        }
        let _ = self.queue_manager.close(task_id).await;

        // Return the final task state.
        self.task_store
            .get(task_id)
            .await?
            .ok_or_else(|| A2AError::TaskNotFound {
                message: task_id.to_string(),
                data: None,
            })
    }

    /// Apply a stream event to the persisted task state via the shared
    /// [`TaskFold`] — the same reduction the client applies to its own copy
    /// of the stream, so the two sides can never disagree on the result.
    ///
    /// Standalone `Message` events are not persisted (there is no task to
    /// attach them to).
    async fn apply_event(&self, task_id: &str, event: &StreamResponse) -> A2AResult<()> {
        persist_event(&self.task_store, task_id, event).await
    }

    /// Consume events from the queue until the shared [`TaskFold`] reports
    /// the stream has finished, returning whichever of `Task`/`Message` it
    /// produced (spec §4.3: `send_message` output is `Task | Message`;
    /// §4.5: "returning the aggregated Task or the direct-reply Message").
    ///
    /// Used by the non-streaming `message/send` path, which is "equivalent
    /// to running the streaming path and folding locally until the fold
    /// reports final" (§4.5) — driving the same [`TaskFold`] the client
    /// drives over its own copy of the stream keeps the two sides from ever
    /// disagreeing on the result. Also stops on `FoldStep::Interruptible`
    /// (`auth-required`): a blocking call cannot wait indefinitely for
    /// out-of-band authentication to complete.
    async fn consume_until_final_response(
        &self,
        task_id: &str,
        mut rx: broadcast::Receiver<StreamResponse>,
    ) -> A2AResult<SendMessageResponse> {
        let seed = self.task_store.get(task_id).await?;
        let mut fold = seed.map(TaskFold::resume).unwrap_or_default();

        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.apply_event(task_id, &event).await?;
                    let step = fold.apply(event)?;
                    if matches!(step, FoldStep::Final | FoldStep::Interruptible) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(task_id = %task_id, missed = n, "Event consumer lagged");
                }
            }
        }

        // Clean up the running agent entry and release the queue.
        {
            let mut running = self.running_agents.lock().await;
            running.remove(task_id);
        }
        let _ = self.queue_manager.close(task_id).await;

        match fold.into_result() {
            Some(response) => Ok(response),
            None => self
                .task_store
                .get(task_id)
                .await?
                .map(SendMessageResponse::Task)
                .ok_or_else(|| A2AError::TaskNotFound {
                    message: task_id.to_string(),
                    data: None,
                }),
        }
    }

    /// Check if a state is terminal.
    fn is_terminal(state: &TaskState) -> bool {
        is_terminal(*state)
    }

    /// Borrow the configured push notification config store, or return
    /// `PushNotificationNotSupported` if none was attached.
    fn require_push_config_store(&self) -> A2AResult<&Arc<dyn PushNotificationConfigStore>> {
        self.push_config_store
            .as_ref()
            .ok_or_else(|| A2AError::PushNotificationNotSupported {
                message: "Push notification config is not supported".to_string(),
                data: None,
            })
    }

    /// Trim task history to the requested length.
    ///
    /// Mirrors Python SDK's `apply_history_length`:
    /// - Only trims if `max_length` is `Some` AND > 0 AND history exists.
    /// - Keeps the most recent N messages (tail).
    fn trim_history(task: &mut Task, max_length: Option<usize>) {
        if let Some(max) = max_length {
            if max > 0 {
                if let Some(ref mut history) = task.history {
                    if history.len() > max {
                        let start = history.len() - max;
                        *history = history.split_off(start);
                    }
                }
            }
        }
    }
}

/// Fold one stream event into the task store's persisted snapshot.
///
/// Shared by [`DefaultRequestHandler::apply_event`] and the background
/// persistence consumer spawned in `on_message_send_stream`, so there is
/// exactly one place the fold rules are applied server-side.
async fn persist_event(
    task_store: &Arc<dyn TaskStore>,
    task_id: &str,
    event: &StreamResponse,
) -> A2AResult<()> {
    if matches!(event, StreamResponse::Message(_)) {
        return Ok(());
    }

    let Some(task) = task_store.get(task_id).await? else {
        return Ok(());
    };

    let mut fold = TaskFold::resume(task);
    fold.apply(event.clone())?;
    let task = fold
        .task()
        .cloned()
        .expect("task-related event always yields a Task snapshot");

    task_store.save(task).await
}

/// Deliver `task` to every push-notification config registered for it.
/// No-op unless both a config store and a sender are configured.
async fn deliver_push_notifications_for_task(
    push_config_store: &Option<Arc<dyn PushNotificationConfigStore>>,
    push_sender: &Option<Arc<dyn PushNotificationSender>>,
    task: &Task,
) {
    let (Some(store), Some(sender)) = (push_config_store, push_sender) else {
        return;
    };
    let configs = match store.list(&task.id).await {
        Ok(c) => c,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Failed to load push notification configs");
            return;
        }
    };
    for cfg in configs {
        sender.send(task, &cfg.push_notification_config).await;
    }
}

/// Load the persisted task and deliver it to its push-notification configs.
/// Used by the background persist loop, which only has the task's id on hand.
async fn deliver_push_notifications(
    push_config_store: &Option<Arc<dyn PushNotificationConfigStore>>,
    push_sender: &Option<Arc<dyn PushNotificationSender>>,
    task_store: &Arc<dyn TaskStore>,
    task_id: &str,
) {
    if push_config_store.is_none() || push_sender.is_none() {
        return;
    }
    match task_store.get(task_id).await {
        Ok(Some(task)) => {
            deliver_push_notifications_for_task(push_config_store, push_sender, &task).await
        }
        Ok(None) => {}
        Err(e) => warn!(task_id = %task_id, error = %e, "Failed to load task for push notification"),
    }
}

#[async_trait]
impl RequestHandler for DefaultRequestHandler {
    async fn on_message_send(&self, params: SendMessageParams) -> A2AResult<SendMessageResponse> {
        let task = self.get_or_create_task(&params).await?;
        let event_queue = self
            .spawn_executor(&task, &params.message, params.configuration.as_ref())
            .await?;
        let rx = event_queue.subscribe();

        // Consume events until the fold reports final — may yield either a
        // Task snapshot or a standalone direct-reply Message.
        let mut response = self.consume_until_final_response(&task.id, rx).await?;

        // Apply history_length trimming (Task responses only).
        if let SendMessageResponse::Task(ref mut final_task) = response {
            let history_length = params.configuration.as_ref().and_then(|c| c.history_length);
            Self::trim_history(final_task, history_length);
        }

        Ok(response)
    }

    async fn on_message_send_stream(
        &self,
        params: SendMessageParams,
    ) -> A2AResult<broadcast::Receiver<StreamResponse>> {
        let task = self.get_or_create_task(&params).await?;
        let event_queue = self
            .spawn_executor(&task, &params.message, params.configuration.as_ref())
            .await?;
        let rx = event_queue.subscribe();

        // Spawn a background task to persist events as they arrive.
        let task_id = task.id.clone();
        let task_store = Arc::clone(&self.task_store);
        let push_config_store = self.push_config_store.clone();
        let push_sender = self.push_sender.clone();

        // We need a separate subscription for persistence.
        let mut persist_rx = event_queue.subscribe();

        tokio::spawn(async move {
            loop {
                match persist_rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = persist_event(&task_store, &task_id, &event).await {
                            warn!(task_id = %task_id, error = %e, "Failed to persist stream event");
                        }

                        if matches!(event, StreamResponse::Task(_)) {
                            deliver_push_notifications(
                                &push_config_store,
                                &push_sender,
                                &task_store,
                                &task_id,
                            )
                            .await;
                        }

                        if let StreamResponse::StatusUpdate(ref update) = event {
                            if is_terminal(update.status.state) || update.r#final {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(task_id = %task_id, missed = n, "Persist consumer lagged");
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn on_get_task(&self, params: GetTaskParams) -> A2AResult<Task> {
        let mut task =
            self.task_store
                .get(&params.id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    message: params.id.clone(),
                    data: None,
                })?;

        Self::trim_history(&mut task, params.history_length);
        Ok(task)
    }

    async fn on_list_tasks(&self, params: TaskListParams) -> A2AResult<TaskListResponse> {
        self.task_store.list(&params).await
    }

    async fn on_cancel_task(&self, params: CancelTaskParams) -> A2AResult<Task> {
        // Look up the task.
        let task =
            self.task_store
                .get(&params.id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    message: params.id.clone(),
                    data: None,
                })?;

        // Can't cancel a terminal task (mirrors Python SDK check).
        if Self::is_terminal(&task.status.state) {
            return Err(A2AError::TaskNotCancelable {
                message: format!(
                    "Task cannot be canceled - current state: {}",
                    task.status.state
                ),
                data: None,
            });
        }

        // Get or create the task's event queue via the queue manager.
        let event_queue = self.producer_queue(&params.id).await;

        let rx = event_queue.subscribe();

        // Call the executor's cancel method.
        // Python SDK passes `None` for the request in cancel context.
        let context = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message: None,
            task: Some(task.clone()),
            configuration: None,
            related_tasks: Vec::new(),
            metadata: params.metadata,
            call_context: None,
        };

        self.executor.cancel(context, event_queue.clone()).await?;

        // Cancel the ongoing producer task, if one exists
        // (mirrors Python SDK's `producer_task.cancel()`).
        {
            let running = self.running_agents.lock().await;
            if let Some(agent) = running.get(&params.id) {
                agent.handle.abort();
            }
        }

        // Consume events until terminal.
        let final_task = self.consume_until_terminal(&task.id, rx).await?;

        // Validate the cancel result (mirrors Python SDK).
        // Python SDK raises TaskNotCancelableError if the result state is not canceled.
        if final_task.status.state != TaskState::Canceled {
            return Err(A2AError::TaskNotCancelable {
                message: format!(
                    "Task cannot be canceled - current state: {}",
                    final_task.status.state
                ),
                data: None,
            });
        }

        Ok(final_task)
    }

    async fn on_subscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<broadcast::Receiver<StreamResponse>> {
        self.tap_or_empty(&params.id).await
    }

    async fn on_resubscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<broadcast::Receiver<StreamResponse>> {
        self.tap_or_empty(&params.id).await
    }

    async fn on_set_task_push_notification_config(
        &self,
        params: serde_json::Value,
    ) -> A2AResult<serde_json::Value> {
        let store = self.require_push_config_store()?;
        let params: crate::types::CreateTaskPushNotificationConfigParams =
            serde_json::from_value(params).map_err(|e| A2AError::InvalidParams {
                message: format!("Invalid push notification config params: {e}"),
                data: None,
            })?;

        self.task_store
            .get(&params.task_id)
            .await?
            .ok_or_else(|| A2AError::TaskNotFound {
                message: params.task_id.clone(),
                data: None,
            })?;

        let mut config = params.config;
        config.id.get_or_insert(params.config_id);

        let saved = store.save(&params.task_id, config).await?;
        serde_json::to_value(saved).map_err(A2AError::from)
    }

    async fn on_get_task_push_notification_config(
        &self,
        params: serde_json::Value,
    ) -> A2AResult<serde_json::Value> {
        let store = self.require_push_config_store()?;
        let params: crate::types::GetTaskPushNotificationConfigParams =
            serde_json::from_value(params).map_err(|e| A2AError::InvalidParams {
                message: format!("Invalid push notification config params: {e}"),
                data: None,
            })?;

        let config = store
            .get(&params.id, params.push_notification_config_id.as_deref())
            .await?
            .ok_or_else(|| A2AError::InvalidParams {
                message: format!("No push notification config found for task {}", params.id),
                data: None,
            })?;

        // Always the full TaskPushNotificationConfig shape, never the bare
        // PushNotificationConfig embedded within it.
        serde_json::to_value(config).map_err(A2AError::from)
    }

    async fn on_list_task_push_notification_config(
        &self,
        params: serde_json::Value,
    ) -> A2AResult<serde_json::Value> {
        let store = self.require_push_config_store()?;
        let params: crate::types::ListTaskPushNotificationConfigParams =
            serde_json::from_value(params).map_err(|e| A2AError::InvalidParams {
                message: format!("Invalid push notification config params: {e}"),
                data: None,
            })?;

        let configs = store.list(&params.id).await?;
        let response = crate::types::ListTaskPushNotificationConfigResponse {
            configs,
            next_page_token: None,
        };
        serde_json::to_value(response).map_err(A2AError::from)
    }

    async fn on_delete_task_push_notification_config(
        &self,
        params: serde_json::Value,
    ) -> A2AResult<()> {
        let store = self.require_push_config_store()?;
        let params: crate::types::DeleteTaskPushNotificationConfigParams =
            serde_json::from_value(params).map_err(|e| A2AError::InvalidParams {
                message: format!("Invalid push notification config params: {e}"),
                data: None,
            })?;

        store
            .delete(&params.id, &params.push_notification_config_id)
            .await
    }
}

impl DefaultRequestHandler {
    /// Tap the task's event queue for streaming, or hand back an
    /// already-closed empty stream if the task is known but its queue has
    /// already been drained and closed (the task finished before the
    /// caller (re)subscribed). Only a task ID the store has never heard of
    /// is a `TaskNotFound`.
    async fn tap_or_empty(&self, task_id: &str) -> A2AResult<broadcast::Receiver<StreamResponse>> {
        self.task_store
            .get(task_id)
            .await?
            .ok_or_else(|| A2AError::TaskNotFound {
                message: task_id.to_string(),
                data: None,
            })?;

        if let Some(tapped) = self.queue_manager.tap(task_id).await {
            Ok(tapped.subscribe())
        } else {
            let empty = EventQueue::with_default_capacity();
            empty.close().await;
            Ok(empty.subscribe())
        }
    }
}
