//! Core client trait and error types.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AgentConfig, AgentResponse, QueryParameters, StreamEvent};
use crate::stream::EventStream;

/// Status reported for failures that never produced an HTTP response.
pub const NO_STATUS: u16 = 0;

/// Status reported for a timed-out call.
pub const TIMEOUT_STATUS: u16 = 504;

/// Status reported for a server-declared error event that names no status.
pub const AGENT_ERROR_STATUS: u16 = 500;

/// Code reported for a server-declared error event that names no code.
pub const DEFAULT_AGENT_CODE: &str = "AGENT_ERROR";

const BODY_SNIPPET_CHARS: usize = 200;

/// The single error type surfaced by every client operation.
///
/// Each variant is one entry of the taxonomy. [`code`](Self::code) gives the
/// short machine-readable token and [`status_code`](Self::status_code) the
/// HTTP-equivalent status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentServiceError {
    #[error("Request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Code reported by the server in the error body, if any.
        code: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream error: {message}")]
    Stream { status: u16, message: String },

    #[error("Agent error ({code}): {message}")]
    Agent {
        message: String,
        code: String,
        status: u16,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentServiceError {
    /// Machine-readable code, e.g. `TIMEOUT` or `NETWORK_ERROR`.
    pub fn code(&self) -> &str {
        match self {
            Self::Timeout { .. } => "TIMEOUT",
            Self::Http { code: Some(code), .. } => code,
            Self::Http { code: None, .. } => "HTTP_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Stream { .. } => "STREAM_ERROR",
            Self::Agent { code, .. } => code,
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP-equivalent status code. `0` when no response was involved.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Timeout { .. } => TIMEOUT_STATUS,
            Self::Http { status, .. } => *status,
            Self::Network(_) | Self::Config(_) => NO_STATUS,
            Self::Stream { status, .. } => *status,
            Self::Agent { status, .. } => *status,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Classify a `reqwest` failure on the request/response path.
    ///
    /// The only timer `reqwest` runs itself is the transport connect timeout,
    /// so `connect_limit` is what a timed-out transport error reports.
    pub(crate) fn from_transport(err: reqwest::Error, connect_limit: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout { after: connect_limit };
        }
        Self::Network(describe(&err))
    }

    /// Classify a `reqwest` failure on the event-stream path.
    pub(crate) fn from_stream_transport(err: reqwest::Error) -> Self {
        Self::Stream {
            status: NO_STATUS,
            message: describe(&err),
        }
    }

    /// Build the error for a non-2xx response from its status and body text.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let reported = serde_json::from_str::<serde_json::Value>(body).ok();
        let code = reported
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(|c| c.as_str())
            .map(str::to_string);
        let detail = reported.as_ref().and_then(|v| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|d| d.as_str()))
        });

        let snippet = snippet(detail.unwrap_or(body));
        let message = if snippet.is_empty() {
            status.to_string()
        } else {
            format!("{} - {}", status, snippet)
        };

        Self::Http {
            status: status.as_u16(),
            message,
            code,
        }
    }

    /// Build the error carried by an application `error` event.
    pub(crate) fn from_agent_event(
        message: String,
        code: Option<String>,
        status: Option<u16>,
    ) -> Self {
        Self::Agent {
            message,
            code: code.unwrap_or_else(|| DEFAULT_AGENT_CODE.to_string()),
            status: status.unwrap_or(AGENT_ERROR_STATUS),
        }
    }
}

/// Render an error together with its source chain.
fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Callback invoked for each event delivered by [`AgentClient::ask_stream`].
///
/// Returning an error closes the stream and fails the whole operation with it.
pub type EventCallback<'a> = dyn FnMut(&StreamEvent) -> Result<(), AgentServiceError> + Send + 'a;

/// Main client trait for ask-agent services.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Ask a question and wait for the fully materialized answer.
    async fn ask(&self, params: &QueryParameters) -> Result<AgentResponse, AgentServiceError>;

    /// Open an event stream for a question.
    async fn events(&self, params: &QueryParameters) -> Result<EventStream, AgentServiceError>;

    /// Ask a question over the event stream, pushing each event to `on_event`.
    ///
    /// Resolves with the payload of the `complete` event.
    async fn ask_stream(
        &self,
        params: &QueryParameters,
        on_event: &mut EventCallback<'_>,
    ) -> Result<AgentResponse, AgentServiceError> {
        let mut events = self.events(params).await?;
        events.drive(on_event).await
    }

    /// Fetch the provider/model catalog.
    async fn get_config(&self) -> Result<AgentConfig, AgentServiceError>;

    /// Liveness check. Never fails; any fault reads as unhealthy.
    async fn health_check(&self) -> bool;
}
