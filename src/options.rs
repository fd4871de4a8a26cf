//! Client and transport configuration.

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashMap;
use std::time::Duration;

/// Default budget for one request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration.
///
/// Deserializable so the embedding application can keep it in its own
/// config file; durations are whole seconds.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ClientOptions {
    /// Absolute service URL or a path prefix such as `/api`.
    pub base_url: String,

    /// Origin a path-prefix base is resolved against.
    #[serde(default)]
    pub origin: Option<String>,

    /// Budget for request/response calls and for opening a stream.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Longest silence tolerated between stream frames. `None` waits forever.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    pub stream_idle_timeout: Option<Duration>,

    #[serde(default)]
    pub transport: TransportOptions,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            origin: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream_idle_timeout: None,
            transport: TransportOptions::default(),
        }
    }

    /// Set the origin used to resolve a path-prefix base.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = Some(timeout);
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }
}

/// Transport configuration options.
///
/// Controls how requests are sent over the network. There is deliberately no
/// total request timeout here: it would also cut live event streams.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportOptions {
    /// HTTP transport configuration
    Http {
        /// TCP/TLS connect timeout. If None, default client behaviour is used.
        #[serde_as(as = "Option<DurationSeconds<u64>>")]
        #[serde(default)]
        connect_timeout: Option<Duration>,
        /// HTTP proxy URL.
        #[serde(default)]
        proxy: Option<String>,
        /// Additional HTTP headers to send with every request.
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
    },
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions::Http {
            connect_timeout: None,
            proxy: None,
            headers: None,
        }
    }
}

impl TransportOptions {
    /// Create new default HTTP transport options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, duration: Duration) -> Self {
        match &mut self {
            TransportOptions::Http { connect_timeout, .. } => *connect_timeout = Some(duration),
        }
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        match self {
            TransportOptions::Http { connect_timeout, .. } => *connect_timeout,
        }
    }

    /// Set the proxy.
    pub fn with_proxy(mut self, proxy_url: String) -> Self {
        match &mut self {
            TransportOptions::Http { proxy, .. } => *proxy = Some(proxy_url),
        }
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        match &mut self {
            TransportOptions::Http { headers, .. } => {
                headers.get_or_insert_with(HashMap::new).insert(key, value);
            }
        }
        self
    }
}
