//! HTTP client utilities for talking to the ask service.

use reqwest::{Client, RequestBuilder};

use crate::client::AgentServiceError;
use crate::options::TransportOptions;

/// Build a configured HTTP client from transport options.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, AgentServiceError> {
    let mut builder = Client::builder();

    match transport_options {
        TransportOptions::Http {
            connect_timeout,
            proxy,
            ..
        } => {
            if let Some(t) = connect_timeout {
                builder = builder.connect_timeout(*t);
            }
            if let Some(proxy_url) = proxy {
                let p = reqwest::Proxy::all(proxy_url).map_err(|e| {
                    AgentServiceError::Config(format!("invalid proxy '{}': {}", proxy_url, e))
                })?;
                builder = builder.proxy(p);
            }
        }
    }

    builder
        .build()
        .map_err(|e| AgentServiceError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    transport_options: &TransportOptions,
) -> RequestBuilder {
    match transport_options {
        TransportOptions::Http { headers, .. } => {
            if let Some(h) = headers {
                for (key, value) in h {
                    request = request.header(key, value);
                }
            }
        }
    }
    request
}

/// Extension trait for Response that logs the body it reads.
#[async_trait::async_trait]
pub trait ResponseExt {
    /// Get response text and log it. Consumes the response.
    async fn text_logged(self) -> Result<String, reqwest::Error>;

    /// Parse response as JSON and log it. Consumes the response.
    ///
    /// Transport failures while reading are returned as-is; a body that is
    /// not the expected JSON becomes a network-classified error.
    async fn json_logged<T: serde::de::DeserializeOwned>(
        self,
    ) -> Result<Result<T, AgentServiceError>, reqwest::Error>;
}

#[async_trait::async_trait]
impl ResponseExt for reqwest::Response {
    async fn text_logged(self) -> Result<String, reqwest::Error> {
        let text = self.text().await?;
        tracing::debug!("API response ({} bytes):\n{}", text.len(), text);
        Ok(text)
    }

    async fn json_logged<T: serde::de::DeserializeOwned>(
        self,
    ) -> Result<Result<T, AgentServiceError>, reqwest::Error> {
        let bytes = self.bytes().await?;

        if let Ok(text) = std::str::from_utf8(&bytes) {
            tracing::debug!("API response ({} bytes):\n{}", text.len(), text);
        }

        Ok(serde_json::from_slice(&bytes)
            .map_err(|e| AgentServiceError::Network(format!("invalid response body: {}", e))))
    }
}
