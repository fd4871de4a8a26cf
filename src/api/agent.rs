//! HTTP implementation of [`AgentClient`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use url::Url;

use crate::client::{AgentClient, AgentServiceError};
use crate::endpoint::{Endpoint, ASK_PATH, ASK_STREAM_PATH, CONFIG_PATH, HEALTH_PATH};
use crate::http::{add_extra_headers, build_http_client, ResponseExt};
use crate::model::{AgentConfig, AgentResponse, QueryParameters};
use crate::options::{ClientOptions, TransportOptions};
use crate::sse::SseResponseExt;
use crate::stream::EventStream;

/// Client for an ask service reachable over HTTP.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
/// ```no_run
/// use agentask::{AgentClient, HttpAgentClient, QueryParameters, StreamEvent};
/// use agentask::options::ClientOptions;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpAgentClient::new(ClientOptions::new("http://localhost:8000/api"))?;
///     let params = QueryParameters::new("How do I rotate my API key?")?;
///
///     let response = client
///         .ask_stream(&params, &mut |event: &StreamEvent| {
///             if let StreamEvent::Thinking { message, .. } = event {
///                 println!("... {}", message);
///             }
///             Ok(())
///         })
///         .await?;
///
///     println!("{}", response.answer);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    request_timeout: Duration,
    stream_idle_timeout: Option<Duration>,
    transport_options: TransportOptions,
}

impl HttpAgentClient {
    /// Create a client. Fails only on invalid configuration.
    pub fn new(options: ClientOptions) -> Result<Self, AgentServiceError> {
        let endpoint = Endpoint::new(&options.base_url, options.origin.as_deref())?;
        let http = build_http_client(&options.transport)?;

        Ok(Self {
            http,
            endpoint,
            request_timeout: options.request_timeout,
            stream_idle_timeout: options.stream_idle_timeout,
            transport_options: options.transport,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Limit reported when `reqwest` itself times out: the connect timeout
    /// if one is configured, otherwise the request budget.
    fn transport_timeout(&self) -> Duration {
        self.transport_options
            .connect_timeout()
            .unwrap_or(self.request_timeout)
    }

    /// Run `exchange` under the request budget.
    ///
    /// The timer is owned by this future and released on every exit path.
    async fn with_budget<T, F>(&self, exchange: F) -> Result<T, AgentServiceError>
    where
        F: Future<Output = Result<T, AgentServiceError>>,
    {
        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(AgentServiceError::Timeout {
                after: self.request_timeout,
            }),
        }
    }

    /// GET `url` and decode a JSON body, classifying every failure.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AgentServiceError> {
        let limit = self.transport_timeout();
        tracing::debug!("GET {}", url);

        self.with_budget(async {
            let request = add_extra_headers(self.http.get(url), &self.transport_options);
            let response = request
                .send()
                .await
                .map_err(|e| AgentServiceError::from_transport(e, limit))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text_logged().await.unwrap_or_default();
                return Err(AgentServiceError::from_status(status, &body));
            }

            response
                .json_logged()
                .await
                .map_err(|e| AgentServiceError::from_transport(e, limit))?
        })
        .await
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn ask(&self, params: &QueryParameters) -> Result<AgentResponse, AgentServiceError> {
        let url = self.endpoint.url(ASK_PATH, &params.query_pairs())?;
        self.get_json(url).await
    }

    async fn events(&self, params: &QueryParameters) -> Result<EventStream, AgentServiceError> {
        let url = self.endpoint.url(ASK_STREAM_PATH, &params.query_pairs())?;
        tracing::debug!("opening ask stream {}", url);

        let response = self
            .with_budget(async {
                let request = add_extra_headers(
                    self.http.get(url.clone()).header(ACCEPT, "text/event-stream"),
                    &self.transport_options,
                );
                let response = request
                    .send()
                    .await
                    .map_err(AgentServiceError::from_stream_transport)?;

                // The error body is read under the same budget as the headers.
                let status = response.status();
                if !status.is_success() {
                    let body = response.text_logged().await.unwrap_or_default();
                    let rejected = AgentServiceError::from_status(status, &body);
                    return Err(AgentServiceError::Stream {
                        status: status.as_u16(),
                        message: rejected.to_string(),
                    });
                }
                Ok(response)
            })
            .await?;

        Ok(EventStream::from_frames(
            response.sse(),
            url.path().to_string(),
            self.stream_idle_timeout,
        ))
    }

    async fn get_config(&self) -> Result<AgentConfig, AgentServiceError> {
        let url = self.endpoint.url(CONFIG_PATH, &[])?;
        self.get_json(url).await
    }

    async fn health_check(&self) -> bool {
        let url = match self.endpoint.url(HEALTH_PATH, &[]) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("health check failed: {}", e);
                return false;
            }
        };

        let limit = self.transport_timeout();
        let outcome = self
            .with_budget(async {
                add_extra_headers(self.http.get(url), &self.transport_options)
                    .send()
                    .await
                    .map_err(|e| AgentServiceError::from_transport(e, limit))
            })
            .await;

        match outcome {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!("health check failed: HTTP {}", response.status());
                false
            }
            Err(e) => {
                tracing::debug!("health check failed: {}", e);
                false
            }
        }
    }
}
