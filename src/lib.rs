//! # agentask - Ask-Agent Service Client
//!
//! A small async client for a remote conversational-agent service that
//! answers questions with cited sources.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Request/response queries with a bounded timeout
//! - Event-stream queries with progress, clarification, completion and error events
//! - One error type with a short machine-readable code for every failure
//! - Absolute or path-prefix (`/api`) service bases
//!
//! ## Architecture
//!
//! 1. **Endpoint** turns a base and a [`QueryParameters`] into a request target.
//! 2. **[`HttpAgentClient`]** performs the calls: [`ask`](AgentClient::ask),
//!    [`events`](AgentClient::events) / [`ask_stream`](AgentClient::ask_stream),
//!    [`get_config`](AgentClient::get_config) and
//!    [`health_check`](AgentClient::health_check).
//! 3. **[`EventStream`]** owns an open stream connection and closes it on
//!    every exit path.
//! 4. **[`AgentServiceError`]** classifies every failure: `TIMEOUT`,
//!    `HTTP_ERROR`, `NETWORK_ERROR`, `STREAM_ERROR` or a server-declared code.
//!
//! ## Example
//! ```no_run
//! use agentask::{AgentClient, HttpAgentClient, Language, QueryParameters};
//! use agentask::options::ClientOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions::new("/api").with_origin("http://localhost:8000");
//!     let client = HttpAgentClient::new(options)?;
//!
//!     let params = QueryParameters::new("What is our refund policy?")?
//!         .with_language(Language::En);
//!
//!     let response = client.ask(&params).await?;
//!     println!("{} ({} sources)", response.answer, response.sources.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod endpoint;
pub mod http;
pub mod model;
pub mod options;
pub mod sse;
pub mod stream;

pub use api::HttpAgentClient;
pub use client::{AgentClient, AgentServiceError, EventCallback};
pub use model::{
    AgentConfig, AgentResponse, InvalidQuery, Language, ProviderInfo, QueryParameters, Source,
    StreamEvent,
};
pub use stream::{EventStream, StreamState};
