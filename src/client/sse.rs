//! Server-Sent Events (SSE) stream handling for A2A streaming responses.
//!
//! Parses SSE `data:` lines from HTTP responses and deserializes them into
//! [`StreamResponse`] events (status updates, artifact updates, task snapshots,
//! and direct messages).

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;

use crate::error::{A2AError, A2AResult};
use crate::fold::{FoldStep, TaskFold};
use crate::types::{Message, SendMessageResponse, StreamResponse, Task};

/// A stream of A2A server-sent events.
///
/// Wraps a raw HTTP response and parses SSE `data:` lines into typed
/// [`StreamResponse`] values. Supports both pull-based (`next()`) and
/// push-based (`Stream` trait) consumption.
///
/// # Example
///
/// ```no_run
/// # async fn example(mut stream: a2a_rs::client::SseStream) {
/// while let Some(event) = stream.next().await {
///     match event {
///         Ok(response) => println!("Got event: {:?}", response),
///         Err(e) => eprintln!("Stream error: {}", e),
///     }
/// }
/// # }
/// ```
pub struct SseStream {
    receiver: mpsc::Receiver<A2AResult<StreamResponse>>,
    /// Background task handle — kept alive so the parsing task runs to completion.
    _task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for SseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseStream").finish_non_exhaustive()
    }
}

impl SseStream {
    /// Create an `SseStream` from a raw `reqwest::Response`.
    ///
    /// Spawns a background task that reads the response body as SSE lines
    /// and sends parsed events through a channel.
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            if let Err(e) = parse_sse_stream(response, &tx).await {
                // Send the final error and then stop. Ignore send failures
                // (receiver may have been dropped).
                let _ = tx.send(Err(e)).await;
            }
        });

        Self {
            receiver: rx,
            _task: task,
        }
    }

    /// Build an `SseStream` from any other transport's already-typed event
    /// stream (e.g. a gRPC server-streaming response), bypassing SSE framing
    /// entirely. Spawns a background task that forwards items into the same
    /// channel [`Self::from_response`] uses, so callers downstream of this
    /// point (including [`FoldedStream`]) don't need to know which wire
    /// binding produced the events.
    pub(crate) fn from_result_stream<S>(mut stream: S) -> Self
    where
        S: Stream<Item = A2AResult<StreamResponse>> + Unpin + Send + 'static,
    {
        use futures::StreamExt;
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let stop = item.is_err();
                if tx.send(item).await.is_err() || stop {
                    break;
                }
            }
        });

        Self {
            receiver: rx,
            _task: task,
        }
    }

    /// Get the next event from the stream.
    ///
    /// Returns `None` when the stream is exhausted (server closed the connection
    /// or sent a terminal event). Returns `Some(Err(...))` on parse or transport
    /// errors.
    pub async fn next(&mut self) -> Option<A2AResult<StreamResponse>> {
        self.receiver.recv().await
    }

    /// Convert this stream into a `futures::Stream`.
    ///
    /// This consumes the `SseStream` and returns an impl `Stream` that yields
    /// `A2AResult<StreamResponse>` items.
    pub fn into_stream(self) -> SseStreamAdapter {
        SseStreamAdapter {
            receiver: self.receiver,
            _task: self._task,
        }
    }
}

/// An [`SseStream`] that folds every event it yields into a running [`Task`]
/// snapshot via [`TaskFold`].
///
/// The same reduction rules the server applies before persisting a task are
/// applied here event-by-event, so a caller that drains this to completion
/// ends up with a `Task` byte-identical to the one the server would produce
/// folding the same event prefix.
pub struct FoldedStream {
    inner: SseStream,
    fold: TaskFold,
}

impl std::fmt::Debug for FoldedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoldedStream").finish_non_exhaustive()
    }
}

impl FoldedStream {
    pub(crate) fn new(inner: SseStream) -> Self {
        Self {
            inner,
            fold: TaskFold::new(),
        }
    }

    /// Wrap a stream that resumes an already-persisted task, so events
    /// observed from here on are folded onto that prior snapshot.
    pub(crate) fn resume(inner: SseStream, task: Task) -> Self {
        Self {
            inner,
            fold: TaskFold::resume(task),
        }
    }

    /// Pull the next event and apply it to the running fold.
    ///
    /// Returns `None` once the underlying stream is exhausted. The returned
    /// [`FoldStep`] reflects the fold's state immediately after this event.
    pub async fn next(&mut self) -> Option<A2AResult<(StreamResponse, FoldStep)>> {
        let event = match self.inner.next().await? {
            Ok(event) => event,
            Err(e) => return Some(Err(e)),
        };
        let result = self
            .fold
            .apply(event.clone())
            .map(|step| (event, step));
        Some(result)
    }

    /// The current folded task snapshot, if the stream has produced one.
    pub fn task(&self) -> Option<&Task> {
        self.fold.task()
    }

    /// The direct-reply message, if the stream took that form.
    pub fn message(&self) -> Option<&Message> {
        self.fold.message()
    }

    /// Whether the fold has observed a finalizing event.
    pub fn is_finalized(&self) -> bool {
        self.fold.is_finalized()
    }

    /// Drain the stream to completion, returning whichever of `Task`/`Message`
    /// the fold produced.
    ///
    /// Stops early with an `Err` on the first transport, parse, or fold
    /// invariant violation.
    pub async fn collect(mut self) -> A2AResult<Option<SendMessageResponse>> {
        while let Some(result) = self.next().await {
            result?;
        }
        Ok(self.fold.into_result())
    }
}

/// Adapter that implements `futures::Stream` for an [`SseStream`].
///
/// Created by [`SseStream::into_stream()`].
pub struct SseStreamAdapter {
    receiver: mpsc::Receiver<A2AResult<StreamResponse>>,
    _task: tokio::task::JoinHandle<()>,
}

impl Stream for SseStreamAdapter {
    type Item = A2AResult<StreamResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Parse an SSE response body line-by-line, sending parsed events to `tx`.
async fn parse_sse_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<A2AResult<StreamResponse>>,
) -> A2AResult<()> {
    use futures::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| A2AError::Transport(format!("error reading SSE stream: {e}")))?;

        let text = std::str::from_utf8(&chunk)
            .map_err(|e| A2AError::Transport(format!("invalid UTF-8 in SSE stream: {e}")))?;

        buffer.push_str(text);

        // Process complete lines from the buffer.
        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
            buffer = buffer[newline_pos + 1..].to_string();

            if let Some(event) = parse_sse_line(&line)? {
                if tx.send(Ok(event)).await.is_err() {
                    // Receiver dropped — stop parsing.
                    return Ok(());
                }
            }
        }
    }

    // Process any remaining data in the buffer (no trailing newline).
    if !buffer.trim().is_empty() {
        if let Some(event) = parse_sse_line(buffer.trim())? {
            let _ = tx.send(Ok(event)).await;
        }
    }

    Ok(())
}

/// Parse a single SSE line. Returns `Some(event)` for `data:` lines with
/// valid JSON, `None` for comments, empty lines, and keep-alive signals.
///
/// Handles two formats:
/// 1. **Raw events** — the data is a `StreamResponse` directly (status update,
///    artifact update, task, or message).
/// 2. **JSON-RPC wrapped** — the data is a full JSON-RPC response with
///    `jsonrpc`, `id`, and `result` fields (as sent by the Python SDK).
///    In this case, the `result` field is extracted and parsed as a
///    `StreamResponse`.
fn parse_sse_line(line: &str) -> A2AResult<Option<StreamResponse>> {
    // Empty line = event boundary (we process data lines individually).
    if line.is_empty() {
        return Ok(None);
    }

    // SSE comments (lines starting with ':') are keep-alive signals.
    if line.starts_with(':') {
        return Ok(None);
    }

    // We only care about `data:` lines.
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();

        // Empty data field — skip.
        if data.is_empty() {
            return Ok(None);
        }

        // "[DONE]" is a common sentinel for stream completion.
        if data == "[DONE]" {
            return Ok(None);
        }

        // Parse the JSON.
        let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
            A2AError::InvalidJson(format!(
                "failed to parse SSE event data: {e} (data: {data})"
            ))
        })?;

        // Detect JSON-RPC wrapper: has "jsonrpc" field.
        let event_value = if value.get("jsonrpc").is_some() {
            // JSON-RPC wrapped response — check for error.
            if let Some(error) = value.get("error") {
                let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                let data = error.get("data").cloned();
                return Err(A2AError::JsonRpc {
                    code,
                    message,
                    data,
                });
            }
            // Extract the `result` field.
            value.get("result").cloned().ok_or_else(|| {
                A2AError::InvalidJson(format!(
                    "JSON-RPC SSE response has neither 'result' nor 'error': {data}"
                ))
            })?
        } else {
            // Raw event — parse directly.
            value
        };

        let event: StreamResponse = serde_json::from_value(event_value).map_err(|e| {
            A2AError::InvalidJson(format!(
                "failed to parse SSE event as StreamResponse: {e} (data: {data})"
            ))
        })?;

        return Ok(Some(event));
    }

    // Other SSE fields (event:, id:, retry:) — ignore for now.
    Ok(None)
}

#[cfg(test)]
impl SseStream {
    /// Build a stream directly from pre-parsed events, bypassing the HTTP
    /// parsing task — for testing consumers like [`FoldedStream`].
    fn from_events(events: Vec<A2AResult<StreamResponse>>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        let task = tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Self {
            receiver: rx,
            _task: task,
        }
    }
}
