//! Task manager — manages task lifecycle during request execution.
//!
//! Responsible for retrieving, saving, and updating the [`Task`] object based on
//! events received from the agent. The actual merge rules (history/metadata
//! handling, artifact append semantics) live in [`crate::fold`]; this module
//! is concerned only with loading the right starting snapshot and persisting
//! the result.

use tracing::{debug, info};

use crate::error::{A2AError, A2AResult};
use crate::fold::TaskFold;
use crate::types::{
    Message, StreamResponse, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};

use super::task_store::TaskStore;

// Re-exported so existing callers of `task_manager::append_artifact_to_task`
// keep working without touching every call site.
pub use crate::fold::append_artifact_to_task;

/// Manages a task's lifecycle during execution of a request.
///
/// Responsible for retrieving, saving, and updating the `Task` object based on
/// events received from the agent.
///
/// Mirrors Python SDK's `TaskManager` from `a2a.server.tasks.task_manager`.
pub struct TaskManager {
    /// The task ID, if known from the request.
    task_id: Option<String>,

    /// The context ID, if known from the request.
    context_id: Option<String>,

    /// The task store for persistence.
    task_store: Box<dyn TaskStore>,

    /// The initial message that created the task (used when creating a new task).
    initial_message: Option<Message>,

    /// The current in-memory task state.
    current_task: Option<Task>,
}

impl TaskManager {
    /// Create a new TaskManager.
    ///
    /// # Arguments
    ///
    /// * `task_id` - The task ID, if known from the request.
    /// * `context_id` - The context ID, if known from the request.
    /// * `task_store` - The task store for persistence.
    /// * `initial_message` - The message that initiated the task, if any.
    pub fn new(
        task_id: Option<String>,
        context_id: Option<String>,
        task_store: Box<dyn TaskStore>,
        initial_message: Option<Message>,
    ) -> Result<Self, A2AError> {
        if let Some(ref id) = task_id {
            if id.is_empty() {
                return Err(A2AError::InvalidParams {
                    message: "Task ID must be a non-empty string".to_string(),
                    data: None,
                });
            }
        }

        debug!(
            task_id = ?task_id,
            context_id = ?context_id,
            "TaskManager initialized"
        );

        Ok(Self {
            task_id,
            context_id,
            task_store,
            initial_message,
            current_task: None,
        })
    }

    /// Retrieves the current task object, either from memory or the store.
    ///
    /// If `task_id` is set, it first checks the in-memory `current_task`,
    /// then attempts to load it from the task store.
    pub async fn get_task(&mut self) -> A2AResult<Option<Task>> {
        let Some(ref task_id) = self.task_id else {
            debug!("task_id is not set, cannot get task");
            return Ok(None);
        };

        if self.current_task.is_some() {
            return Ok(self.current_task.clone());
        }

        debug!(task_id = %task_id, "Attempting to get task from store");
        let task = self.task_store.get(task_id).await?;
        if task.is_some() {
            debug!(task_id = %task_id, "Task retrieved successfully");
        } else {
            debug!(task_id = %task_id, "Task not found");
        }
        self.current_task = task.clone();
        Ok(task)
    }

    /// Processes a task-related event and saves the updated task state.
    ///
    /// Ensures task and context IDs match or are set from the event.
    /// Handles `Task`, `TaskStatusUpdateEvent`, and `TaskArtifactUpdateEvent`.
    ///
    /// Mirrors Python SDK's `TaskManager.save_task_event`.
    pub async fn save_task_event(&mut self, event: TaskEvent) -> A2AResult<Option<Task>> {
        let (task_id_from_event, context_id_from_event) = match &event {
            TaskEvent::Task(t) => (t.id.clone(), t.context_id.clone()),
            TaskEvent::StatusUpdate(e) => (e.task_id.clone(), e.context_id.clone()),
            TaskEvent::ArtifactUpdate(e) => (e.task_id.clone(), e.context_id.clone()),
        };

        // Validate task ID consistency
        if let Some(ref our_id) = self.task_id {
            if *our_id != task_id_from_event {
                return Err(A2AError::InvalidParams {
                    message: format!(
                        "Task in event doesn't match TaskManager {} : {}",
                        our_id, task_id_from_event
                    ),
                    data: None,
                });
            }
        }
        if self.task_id.is_none() {
            self.task_id = Some(task_id_from_event.clone());
        }

        // Validate context ID consistency
        if let Some(ref our_ctx) = self.context_id {
            if *our_ctx != context_id_from_event {
                return Err(A2AError::InvalidParams {
                    message: format!(
                        "Context in event doesn't match TaskManager {} : {}",
                        our_ctx, context_id_from_event
                    ),
                    data: None,
                });
            }
        }
        if self.context_id.is_none() {
            self.context_id = Some(context_id_from_event);
        }

        debug!(
            event_type = %event.type_name(),
            task_id = %task_id_from_event,
            "Processing save of task event"
        );

        let existing = self.ensure_loaded(&task_id_from_event).await?;
        let mut fold = match existing {
            Some(task) => TaskFold::resume(task),
            None => {
                info!(
                    task_id = %task_id_from_event,
                    context_id = %context_id_from_event,
                    "Task not found. Creating new task for event."
                );
                TaskFold::resume(
                    self.init_task_obj(task_id_from_event.clone(), context_id_from_event.clone()),
                )
            }
        };

        let stream_event = match event {
            TaskEvent::Task(task) => StreamResponse::Task(task),
            TaskEvent::StatusUpdate(e) => StreamResponse::StatusUpdate(e),
            TaskEvent::ArtifactUpdate(e) => StreamResponse::ArtifactUpdate(e),
        };
        fold.apply(stream_event)?;

        let task = fold
            .into_result()
            .and_then(|r| match r {
                crate::types::SendMessageResponse::Task(t) => Some(t),
                crate::types::SendMessageResponse::Message(_) => None,
            })
            .expect("TaskEvent always folds to a Task snapshot");

        self.save_task(task.clone()).await?;
        Ok(Some(task))
    }

    /// Returns the current task from memory, or loads it from the store.
    async fn ensure_loaded(&mut self, task_id: &str) -> A2AResult<Option<Task>> {
        if let Some(ref task) = self.current_task {
            return Ok(Some(task.clone()));
        }
        debug!(task_id = %task_id, "Attempting to retrieve existing task");
        let task = self.task_store.get(task_id).await?;
        self.current_task = task.clone();
        Ok(task)
    }

    /// Process a `StreamResponse` event, updating task state if applicable.
    ///
    /// If the event is task-related, the internal task state is updated and persisted.
    /// Non-task events (e.g., direct Messages) are passed through.
    ///
    /// Mirrors Python SDK's `TaskManager.process`.
    pub async fn process(&mut self, event: StreamResponse) -> A2AResult<StreamResponse> {
        match &event {
            StreamResponse::Task(task) => {
                self.save_task_event(TaskEvent::Task(task.clone())).await?;
            }
            StreamResponse::StatusUpdate(status) => {
                self.save_task_event(TaskEvent::StatusUpdate(status.clone()))
                    .await?;
            }
            StreamResponse::ArtifactUpdate(artifact) => {
                self.save_task_event(TaskEvent::ArtifactUpdate(artifact.clone()))
                    .await?;
            }
            StreamResponse::Message(_) => {
                // Messages are not persisted in the task store
            }
        }
        Ok(event)
    }

    /// Updates a task object by adding a new message to its history.
    ///
    /// If the task has a message in its current status, that message is moved
    /// to the history first.
    ///
    /// Mirrors Python SDK's `TaskManager.update_with_message`.
    pub fn update_with_message(&mut self, message: Message, task: &mut Task) {
        if let Some(ref status_msg) = task.status.message {
            let history = task.history.get_or_insert_with(Vec::new);
            history.push(status_msg.clone());
            task.status.message = None;
        }
        let history = task.history.get_or_insert_with(Vec::new);
        history.push(message);
        self.current_task = Some(task.clone());
    }

    /// Returns the current task ID.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Returns the current context ID.
    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    // -- Private helpers --

    /// Initializes a new task object.
    fn init_task_obj(&self, task_id: String, context_id: String) -> Task {
        debug!(
            task_id = %task_id,
            context_id = %context_id,
            "Initializing new Task object"
        );

        let history = self.initial_message.as_ref().map(|msg| vec![msg.clone()]);

        Task {
            id: task_id,
            context_id,
            kind: "task".to_string(),
            status: TaskStatus {
                state: TaskState::Submitted,
                message: None,
                timestamp: None,
            },
            artifacts: None,
            history,
            metadata: None,
        }
    }

    /// Saves the given task to the store and updates the in-memory cache.
    async fn save_task(&mut self, task: Task) -> A2AResult<()> {
        debug!(task_id = %task.id, "Saving task");
        self.task_store.save(task.clone()).await?;

        if self.task_id.is_none() {
            info!(task_id = %task.id, "New task created");
            self.task_id = Some(task.id.clone());
            self.context_id = Some(task.context_id.clone());
        }

        self.current_task = Some(task);
        Ok(())
    }
}

/// A task-related event that the TaskManager can process.
///
/// Mirrors the Python SDK's `Task | TaskStatusUpdateEvent | TaskArtifactUpdateEvent`
/// union used in `TaskManager.save_task_event`.
pub enum TaskEvent {
    /// A complete task snapshot.
    Task(Task),
    /// A status update event.
    StatusUpdate(TaskStatusUpdateEvent),
    /// An artifact update event.
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl TaskEvent {
    /// Returns a human-readable type name for logging.
    fn type_name(&self) -> &'static str {
        match self {
            TaskEvent::Task(_) => "Task",
            TaskEvent::StatusUpdate(_) => "TaskStatusUpdateEvent",
            TaskEvent::ArtifactUpdate(_) => "TaskArtifactUpdateEvent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::task_store::InMemoryTaskStore;
    use crate::types::{TaskState, TaskStatus};

    fn make_task(id: &str, ctx: &str) -> Task {
        Task {
            id: id.to_string(),
            context_id: ctx.to_string(),
            kind: "task".to_string(),
            status: TaskStatus {
                state: TaskState::Submitted,
                message: None,
                timestamp: None,
            },
            artifacts: None,
            history: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn task_manager_creates_task_on_status_event() {
        let store = Box::new(InMemoryTaskStore::new());
        let mut mgr = TaskManager::new(None, None, store, None).unwrap();

        let event = TaskEvent::StatusUpdate(TaskStatusUpdateEvent {
            task_id: "t1".to_string(),
            context_id: "ctx1".to_string(),
            kind: "status-update".to_string(),
            status: TaskStatus {
                state: TaskState::Working,
                message: None,
                timestamp: None,
            },
            r#final: false,
            metadata: None,
        });

        let result = mgr.save_task_event(event).await.unwrap();
        assert!(result.is_some());

        let task = result.unwrap();
        assert_eq!(task.id, "t1");
        assert_eq!(task.status.state, TaskState::Working);
    }

    #[tokio::test]
    async fn task_manager_rejects_mismatched_task_id() {
        let store = Box::new(InMemoryTaskStore::new());
        let mut mgr = TaskManager::new(Some("t1".to_string()), None, store, None).unwrap();

        let event = TaskEvent::StatusUpdate(TaskStatusUpdateEvent {
            task_id: "t2".to_string(),
            context_id: "ctx1".to_string(),
            kind: "status-update".to_string(),
            status: TaskStatus {
                state: TaskState::Working,
                message: None,
                timestamp: None,
            },
            r#final: false,
            metadata: None,
        });

        let result = mgr.save_task_event(event).await;
        assert!(result.is_err());
    }

    #[test]
    fn update_with_message_moves_status_to_history() {
        let store = Box::new(InMemoryTaskStore::new());
        let mut mgr = TaskManager::new(
            Some("t1".to_string()),
            Some("ctx1".to_string()),
            store,
            None,
        )
        .unwrap();

        let status_msg = Message::agent("m1", "Status message");
        let mut task = make_task("t1", "ctx1");
        task.status.message = Some(status_msg);

        let new_msg = Message::user("m2", "New user message");
        mgr.update_with_message(new_msg, &mut task);

        // Status message should have been moved to history
        assert!(task.status.message.is_none());
        let history = task.history.as_ref().unwrap();
        assert_eq!(history.len(), 2); // status msg + new msg
        assert_eq!(history[0].message_id, "m1");
        assert_eq!(history[1].message_id, "m2");
    }
}
