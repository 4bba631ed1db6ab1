//! The task fold — deterministic reduction of a stream of events into a
//! `Task` snapshot.
//!
//! This is the one place the rules for merging a `Task`, `TaskStatusUpdateEvent`,
//! `TaskArtifactUpdateEvent`, or standalone `Message` into a running snapshot are
//! written down. Both the client (folding an SSE/gRPC stream into the task it
//! hands back to its caller) and the server (folding executor output before
//! persisting and forwarding) drive the *same* type, so the two sides can never
//! drift apart on ordering, history/metadata merge, or finality detection.

use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};
use crate::types::{
    Artifact, StreamResponse, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
};

/// What happened to the fold after applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldStep {
    /// The snapshot changed; the stream continues.
    Ongoing,
    /// The task entered a state from which it may resume after external
    /// action (currently: `auth-required`). Not final, but callers may
    /// choose to stop blocking and return control to the caller.
    Interruptible,
    /// The stream has reached its end — no further events will be observed.
    Final,
}

impl FoldStep {
    /// True for `Final` only. `Interruptible` is not final: the spec
    /// explicitly carves it out of the finality test (§4.2).
    pub fn is_final(self) -> bool {
        matches!(self, FoldStep::Final)
    }
}

/// True for states from which no further transitions occur.
pub fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Completed | TaskState::Canceled | TaskState::Failed | TaskState::Rejected
    )
}

/// Terminal, plus the two states a consumer may need to stop and hand
/// control back without the task being truly finished.
pub fn is_interruptable(state: TaskState) -> bool {
    is_terminal(state) || matches!(state, TaskState::AuthRequired | TaskState::InputRequired)
}

/// States the fold reports as *final* (stream end), excluding `auth-required`
/// which is merely interruptible — the spec's one carve-out.
fn is_final_state(state: TaskState) -> bool {
    is_terminal(state) || matches!(state, TaskState::InputRequired | TaskState::Unknown)
}

/// A deterministic reducer that folds a sequence of [`StreamResponse`] events
/// into a `Task` snapshot (or a standalone direct-reply `Message`).
///
/// Rules applied in order for each event (spec §4.2):
/// 1. `Task` with no existing snapshot — adopt wholesale.
/// 2. `Task` with an existing snapshot — `InvalidState("DuplicateInitialTask")`.
/// 3. `TaskStatusUpdateEvent` — synthesize an `unknown`-state snapshot if none
///    exists, move the prior status message to history, shallow-merge
///    metadata, replace status.
/// 4. `TaskArtifactUpdateEvent` — replace/insert on `append=false`; concatenate
///    parts on `append=true` with a match; silently drop on `append=true`
///    with no match.
/// 5. Standalone `Message` — only valid as the first and only event.
#[derive(Debug, Default)]
pub struct TaskFold {
    task: Option<Task>,
    message: Option<crate::types::Message>,
    events_applied: usize,
    finalized: bool,
}

impl TaskFold {
    /// Start a fold with no prior snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a fold from an already-persisted snapshot (e.g. the server
    /// loading a task from the store before replaying new events onto it).
    pub fn resume(task: Task) -> Self {
        Self {
            task: Some(task),
            message: None,
            events_applied: 0,
            finalized: false,
        }
    }

    /// The current snapshot, if any event has produced one.
    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// The direct-reply message, if the stream took that form.
    pub fn message(&self) -> Option<&crate::types::Message> {
        self.message.as_ref()
    }

    /// Consume the fold, returning whichever of `Task`/`Message` was produced.
    pub fn into_result(self) -> Option<crate::types::SendMessageResponse> {
        if let Some(msg) = self.message {
            Some(crate::types::SendMessageResponse::Message(msg))
        } else {
            self.task.map(crate::types::SendMessageResponse::Task)
        }
    }

    /// Whether the fold has observed a finalizing event.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Apply one event to the running snapshot.
    ///
    /// Returns `Err` for protocol violations (invariant 2 and 4): a second
    /// `Task` event, or a `Message` event that isn't first-and-only. Once
    /// finalized, applying any further event is itself an `InvalidState`
    /// error (invariant 5: "after final, no further events are emitted").
    pub fn apply(&mut self, event: StreamResponse) -> A2AResult<FoldStep> {
        if self.finalized {
            return Err(A2AError::invalid_state(
                "event observed after the fold had already finalized",
            ));
        }
        self.events_applied += 1;

        match event {
            StreamResponse::Message(msg) => {
                if self.events_applied != 1 {
                    return Err(A2AError::invalid_state(
                        "a Message event must be the first and only event in a stream",
                    ));
                }
                self.message = Some(msg);
                self.finalized = true;
                Ok(FoldStep::Final)
            }
            StreamResponse::Task(task) => {
                if self.task.is_some() {
                    return Err(A2AError::invalid_state("DuplicateInitialTask"));
                }
                let state = task.status.state;
                self.task = Some(task);
                Ok(self.finality_for(state))
            }
            StreamResponse::StatusUpdate(ev) => {
                let task = self.task.get_or_insert_with(|| {
                    synth_task(ev.task_id.clone(), ev.context_id.clone())
                });

                if let Some(msg) = task.status.message.take() {
                    task.history.get_or_insert_with(Vec::new).push(msg);
                }
                if let Some(event_meta) = ev.metadata {
                    merge_metadata(task, event_meta);
                }
                let final_flag = ev.r#final;
                task.status = ev.status;
                let state = task.status.state;

                if final_flag {
                    self.finalized = true;
                    return Ok(FoldStep::Final);
                }
                Ok(self.finality_for(state))
            }
            StreamResponse::ArtifactUpdate(ev) => {
                let task = self.task.get_or_insert_with(|| {
                    synth_task(ev.task_id.clone(), ev.context_id.clone())
                });
                append_artifact_to_task(task, &ev);
                Ok(FoldStep::Ongoing)
            }
        }
    }

    fn finality_for(&mut self, state: TaskState) -> FoldStep {
        if is_final_state(state) {
            self.finalized = true;
            FoldStep::Final
        } else if matches!(state, TaskState::AuthRequired) {
            FoldStep::Interruptible
        } else {
            FoldStep::Ongoing
        }
    }
}

fn synth_task(task_id: String, context_id: String) -> Task {
    debug!(task_id = %task_id, context_id = %context_id, "synthesizing task snapshot from status event");
    Task {
        id: task_id,
        context_id,
        kind: "task".to_string(),
        status: TaskStatus {
            state: TaskState::Unknown,
            message: None,
            timestamp: None,
        },
        artifacts: None,
        history: None,
        metadata: None,
    }
}

fn merge_metadata(task: &mut Task, event_meta: serde_json::Value) {
    let task_meta = task
        .metadata
        .get_or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if let (Some(task_obj), Some(event_obj)) = (task_meta.as_object_mut(), event_meta.as_object())
    {
        for (k, v) in event_obj {
            task_obj.insert(k.clone(), v.clone());
        }
    }
}

/// Applies artifact-append semantics (spec §3 invariant 3, §4.2 rule 4) to a
/// task snapshot in place.
pub fn append_artifact_to_task(task: &mut Task, event: &TaskArtifactUpdateEvent) {
    let artifacts = task.artifacts.get_or_insert_with(Vec::new);
    let new_artifact: &Artifact = &event.artifact;
    let artifact_id = &new_artifact.artifact_id;
    let append_parts = event.append.unwrap_or(false);

    let existing_idx = artifacts.iter().position(|a| a.artifact_id == *artifact_id);

    if !append_parts {
        if let Some(idx) = existing_idx {
            debug!(artifact_id = %artifact_id, task_id = %task.id, "replacing artifact");
            artifacts[idx] = new_artifact.clone();
        } else {
            debug!(artifact_id = %artifact_id, task_id = %task.id, "adding new artifact");
            artifacts.push(new_artifact.clone());
        }
    } else if let Some(idx) = existing_idx {
        debug!(artifact_id = %artifact_id, task_id = %task.id, "appending parts to artifact");
        artifacts[idx].parts.extend(new_artifact.parts.clone());
    } else {
        warn!(
            artifact_id = %artifact_id,
            task_id = %task.id,
            "received append=true for a nonexistent artifact; dropping chunk"
        );
    }
}

/// Truncates `task.history` to its last `n` messages in place (spec §8
/// property 6: idempotent for `n >= history.len()`).
pub fn apply_history_length(mut task: Task, n: Option<i32>) -> Task {
    let Some(n) = n else { return task };
    if n < 0 {
        return task;
    }
    let n = n as usize;
    if let Some(history) = task.history.as_mut() {
        if history.len() > n {
            let drop = history.len() - n;
            history.drain(0..drop);
        }
    }
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Artifact, Message, Part, Role, Task, TaskArtifactUpdateEvent, TaskStatus,
        TaskStatusUpdateEvent,
    };

    fn status_event(task_id: &str, state: TaskState, is_final: bool) -> StreamResponse {
        StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
            task_id: task_id.to_string(),
            context_id: "ctx".to_string(),
            kind: "status-update".to_string(),
            status: TaskStatus {
                state,
                message: None,
                timestamp: None,
            },
            r#final: is_final,
            metadata: None,
        })
    }

    fn task_event(id: &str, state: TaskState) -> StreamResponse {
        StreamResponse::Task(Task {
            id: id.to_string(),
            context_id: "ctx".to_string(),
            kind: "task".to_string(),
            status: TaskStatus {
                state,
                message: None,
                timestamp: None,
            },
            artifacts: None,
            history: None,
            metadata: None,
        })
    }

    // S2 — streaming, one status progression.
    #[test]
    fn s2_status_progression() {
        let mut fold = TaskFold::new();
        assert_eq!(
            fold.apply(task_event("t1", TaskState::Submitted)).unwrap(),
            FoldStep::Ongoing
        );
        assert_eq!(
            fold.apply(status_event("t1", TaskState::Working, false)).unwrap(),
            FoldStep::Ongoing
        );
        assert_eq!(
            fold.apply(status_event("t1", TaskState::Completed, true)).unwrap(),
            FoldStep::Final
        );
        let task = fold.task().unwrap();
        assert_eq!(task.status.state, TaskState::Completed);
        assert!(task.history.is_none());
        assert!(task.artifacts.is_none());
    }

    // S3 — streaming with artifact append.
    #[test]
    fn s3_artifact_append() {
        let mut fold = TaskFold::new();
        fold.apply(task_event("t1", TaskState::Working)).unwrap();
        fold.apply(StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent {
            task_id: "t1".to_string(),
            context_id: "ctx".to_string(),
            kind: "artifact-update".to_string(),
            artifact: Artifact {
                artifact_id: "a1".to_string(),
                name: None,
                description: None,
                parts: vec![Part::text("Hel")],
                metadata: None,
                extensions: None,
            },
            append: Some(false),
            last_chunk: Some(false),
            metadata: None,
        }))
        .unwrap();
        fold.apply(StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent {
            task_id: "t1".to_string(),
            context_id: "ctx".to_string(),
            kind: "artifact-update".to_string(),
            artifact: Artifact {
                artifact_id: "a1".to_string(),
                name: None,
                description: None,
                parts: vec![Part::text("lo")],
                metadata: None,
                extensions: None,
            },
            append: Some(true),
            last_chunk: Some(true),
            metadata: None,
        }))
        .unwrap();
        fold.apply(status_event("t1", TaskState::Completed, true)).unwrap();

        let task = fold.task().unwrap();
        let artifacts = task.artifacts.as_ref().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].parts.len(), 2);
        match (&artifacts[0].parts[0], &artifacts[0].parts[1]) {
            (Part::Text { text: a, .. }, Part::Text { text: b, .. }) => {
                assert_eq!(a, "Hel");
                assert_eq!(b, "lo");
            }
            _ => panic!("expected text parts"),
        }
    }

    // S4 — direct-reply message.
    #[test]
    fn s4_direct_reply_message() {
        let mut fold = TaskFold::new();
        let step = fold
            .apply(StreamResponse::Message(Message::agent("m2", "ok")))
            .unwrap();
        assert_eq!(step, FoldStep::Final);
        assert!(fold.task().is_none());
        assert_eq!(fold.message().unwrap().message_id, "m2");
    }

    #[test]
    fn message_after_other_event_is_rejected() {
        let mut fold = TaskFold::new();
        fold.apply(task_event("t1", TaskState::Working)).unwrap();
        let err = fold
            .apply(StreamResponse::Message(Message::agent("m2", "ok")))
            .unwrap_err();
        assert!(matches!(err, A2AError::InvalidState(_)));
    }

    #[test]
    fn duplicate_initial_task_errors() {
        let mut fold = TaskFold::new();
        fold.apply(task_event("t1", TaskState::Submitted)).unwrap();
        let err = fold.apply(task_event("t1", TaskState::Working)).unwrap_err();
        assert!(matches!(err, A2AError::InvalidState(_)));
    }

    #[test]
    fn event_after_finalized_errors() {
        let mut fold = TaskFold::new();
        fold.apply(status_event("t1", TaskState::Completed, true)).unwrap();
        let err = fold.apply(status_event("t1", TaskState::Working, false)).unwrap_err();
        assert!(matches!(err, A2AError::InvalidState(_)));
    }

    #[test]
    fn auth_required_is_interruptible_not_final() {
        let mut fold = TaskFold::new();
        let step = fold
            .apply(status_event("t1", TaskState::AuthRequired, false))
            .unwrap();
        assert_eq!(step, FoldStep::Interruptible);
        assert!(!fold.is_finalized());
    }

    #[test]
    fn unknown_and_input_required_are_final() {
        let mut fold = TaskFold::new();
        assert_eq!(
            fold.apply(status_event("t1", TaskState::InputRequired, false)).unwrap(),
            FoldStep::Final
        );

        let mut fold2 = TaskFold::new();
        assert_eq!(
            fold2.apply(status_event("t1", TaskState::Unknown, false)).unwrap(),
            FoldStep::Final
        );
    }

    #[test]
    fn artifact_append_unknown_id_dropped_silently() {
        let mut fold = TaskFold::new();
        fold.apply(task_event("t1", TaskState::Working)).unwrap();
        let step = fold
            .apply(StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent {
                task_id: "t1".to_string(),
                context_id: "ctx".to_string(),
                kind: "artifact-update".to_string(),
                artifact: Artifact {
                    artifact_id: "missing".to_string(),
                    name: None,
                    description: None,
                    parts: vec![Part::text("x")],
                    metadata: None,
                    extensions: None,
                },
                append: Some(true),
                last_chunk: None,
                metadata: None,
            }))
            .unwrap();
        assert_eq!(step, FoldStep::Ongoing);
        assert!(fold.task().unwrap().artifacts.as_ref().unwrap().is_empty());
    }

    #[test]
    fn status_message_moves_to_history() {
        let mut fold = TaskFold::new();
        fold.apply(task_event("t1", TaskState::Submitted)).unwrap();
        let mut with_msg = status_event("t1", TaskState::Working, false);
        if let StreamResponse::StatusUpdate(ref mut ev) = with_msg {
            ev.status.message = Some(Message::agent("m1", "thinking"));
        }
        fold.apply(with_msg).unwrap();

        let mut next = status_event("t1", TaskState::Completed, true);
        if let StreamResponse::StatusUpdate(ref mut ev) = next {
            ev.status.message = None;
        }
        fold.apply(next).unwrap();

        let task = fold.task().unwrap();
        let history = task.history.as_ref().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Agent);
    }

    #[test]
    fn apply_history_length_truncates_tail() {
        let task = Task {
            id: "t1".to_string(),
            context_id: "ctx".to_string(),
            kind: "task".to_string(),
            status: TaskStatus {
                state: TaskState::Completed,
                message: None,
                timestamp: None,
            },
            artifacts: None,
            history: Some(vec![
                Message::user("m1", "a"),
                Message::user("m2", "b"),
                Message::user("m3", "c"),
            ]),
            metadata: None,
        };
        let truncated = apply_history_length(task.clone(), Some(2));
        let history = truncated.history.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message_id, "m2");
        assert_eq!(history[1].message_id, "m3");

        // idempotent for n >= len
        let unchanged = apply_history_length(task, Some(10));
        assert_eq!(unchanged.history.unwrap().len(), 3);
    }
}
