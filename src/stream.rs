//! Ask-stream lifecycle.
//!
//! An open stream moves through `Open → Completed | Failed`, or `Cancelled`
//! when the caller closes it early. Every exit path closes the underlying
//! connection exactly once: the connection lives in a guard that closes on
//! drop, and terminal paths close it explicitly before the terminal item is
//! handed out, so nothing read afterwards can reach the caller.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use futures::ready;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{AgentServiceError, EventCallback, NO_STATUS};
use crate::model::{AgentResponse, StreamEvent};
use crate::sse::SseFrame;

/// Boxed source of SSE frames backing one stream connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, AgentServiceError>> + Send>>;

type EventItems = Pin<Box<dyn Stream<Item = Result<StreamEvent, AgentServiceError>> + Send>>;

/// Where an [`EventStream`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    /// A `complete` event was delivered.
    Completed,
    /// An error was delivered, or the event callback failed.
    Failed,
    /// The caller closed the stream before a terminal event.
    Cancelled,
}

/// Owns an open connection. Closing is idempotent and also happens on drop.
struct Connection {
    frames: Option<FrameStream>,
    target: String,
}

impl Connection {
    fn new(frames: FrameStream, target: String) -> Self {
        Self {
            frames: Some(frames),
            target,
        }
    }

    async fn next_frame(&mut self) -> Option<Result<SseFrame, AgentServiceError>> {
        match self.frames.as_mut() {
            Some(frames) => frames.next().await,
            None => None,
        }
    }

    fn close(&mut self) {
        if self.frames.take().is_some() {
            debug!(url = %self.target, "ask stream connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse one frame as a [`StreamEvent`].
///
/// Malformed JSON and unknown event types yield `None`.
pub fn decode_event(frame: &SseFrame) -> Option<StreamEvent> {
    let mut value: Value = match serde_json::from_str(&frame.data) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "discarding malformed stream frame");
            return None;
        }
    };

    // Fall back to the SSE event name when the payload carries no type.
    if let (Value::Object(map), Some(name)) = (&mut value, frame.event.as_deref()) {
        if !map.contains_key("type") && name != "message" {
            map.insert("type".to_string(), Value::String(name.to_string()));
        }
    }

    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "discarding unrecognised stream event");
            None
        }
    }
}

fn run(
    mut conn: Connection,
    idle_timeout: Option<Duration>,
) -> impl Stream<Item = Result<StreamEvent, AgentServiceError>> + Send {
    async_stream::stream! {
        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, conn.next_frame()).await {
                    Ok(next) => next,
                    Err(_) => {
                        conn.close();
                        warn!(url = %conn.target, "ask stream stalled for {:?}", limit);
                        yield Err(AgentServiceError::Timeout { after: limit });
                        break;
                    }
                },
                None => conn.next_frame().await,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    conn.close();
                    yield Err(e);
                    break;
                }
                None => {
                    conn.close();
                    warn!(url = %conn.target, "ask stream ended before a terminal event");
                    yield Err(AgentServiceError::Stream {
                        status: NO_STATUS,
                        message: "stream ended before a terminal event".to_string(),
                    });
                    break;
                }
            };

            let Some(event) = decode_event(&frame) else {
                continue;
            };

            match event {
                StreamEvent::Error { message, code, status_code } => {
                    conn.close();
                    warn!(url = %conn.target, code = ?code, "agent reported an error: {}", message);
                    yield Err(AgentServiceError::from_agent_event(message, code, status_code));
                    break;
                }
                event if event.is_terminal() => {
                    conn.close();
                    yield Ok(event);
                    break;
                }
                event => yield Ok(event),
            }
        }
    }
}

/// Events of one ask stream, in wire order.
///
/// Yields at most one `Err` and ends after any terminal item. Dropping the
/// stream closes the connection.
pub struct EventStream {
    inner: Option<EventItems>,
    state: StreamState,
}

impl EventStream {
    /// Wrap an open frame source. `target` is only used for logging.
    pub fn from_frames<S>(frames: S, target: impl Into<String>, idle_timeout: Option<Duration>) -> Self
    where
        S: Stream<Item = Result<SseFrame, AgentServiceError>> + Send + 'static,
    {
        let conn = Connection::new(Box::pin(frames), target.into());
        Self {
            inner: Some(Box::pin(run(conn, idle_timeout))),
            state: StreamState::Open,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Close the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        self.finish(StreamState::Cancelled);
    }

    fn finish(&mut self, state: StreamState) {
        self.inner = None;
        if self.state == StreamState::Open {
            self.state = state;
        }
    }

    /// Push every event to `on_event` until the stream terminates.
    ///
    /// Resolves with the `complete` payload. A callback error closes the
    /// stream and is returned unchanged.
    pub async fn drive(
        &mut self,
        on_event: &mut EventCallback<'_>,
    ) -> Result<AgentResponse, AgentServiceError> {
        while let Some(item) = self.next().await {
            let event = item?;
            if let Err(fault) = on_event(&event) {
                // Overrides `Completed` when the fault is on the final event.
                self.inner = None;
                self.state = StreamState::Failed;
                return Err(fault);
            }
            if let StreamEvent::Complete(response) = event {
                return Ok(response);
            }
        }

        Err(AgentServiceError::Stream {
            status: NO_STATUS,
            message: "stream closed before completion".to_string(),
        })
    }
}

impl Stream for EventStream {
    type Item = Result<StreamEvent, AgentServiceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(inner.as_mut().poll_next(cx)) {
            Some(Ok(event)) => {
                if event.is_terminal() {
                    this.finish(StreamState::Completed);
                }
                Poll::Ready(Some(Ok(event)))
            }
            Some(Err(e)) => {
                this.finish(StreamState::Failed);
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.finish(StreamState::Failed);
                Poll::Ready(None)
            }
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
