//! Request target construction.
//!
//! A service base is either an absolute URL (`https://agent.example.com/api`)
//! or a path prefix such as `/api` mounted behind a reverse proxy. Targets are
//! built as plain strings first and only resolved to an absolute [`Url`] when
//! a request is issued, so both kinds of base produce the same path.

use url::form_urlencoded;
use url::Url;

use crate::client::AgentServiceError;

pub const ASK_PATH: &str = "/ask";
pub const ASK_STREAM_PATH: &str = "/ask/stream";
pub const CONFIG_PATH: &str = "/ask/config";
pub const HEALTH_PATH: &str = "/health";

/// Join `base` and `path` with a single `/` and append `query` in order.
///
/// An empty `query` adds no `?`.
pub fn build_target(base: &str, path: &str, query: &[(&str, &str)]) -> String {
    let mut target = String::with_capacity(base.len() + path.len() + 32);
    target.push_str(base.trim_end_matches('/'));
    target.push('/');
    target.push_str(path.trim_start_matches('/'));

    if !query.is_empty() {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        target.push('?');
        target.push_str(&encoded);
    }

    target
}

/// A validated service base that can produce absolute request URLs.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base: String,
    origin: Option<Url>,
}

impl Endpoint {
    /// Validate `base`, resolving it against `origin` when it is a path prefix.
    pub fn new(base: &str, origin: Option<&str>) -> Result<Self, AgentServiceError> {
        let base = base.trim();

        // Anything that parses as a URL must be a usable http(s) base; only
        // strings that do not parse at all are treated as path prefixes.
        if let Ok(url) = Url::parse(base) {
            check_http_base(&url, "base URL")?;
            return Ok(Self {
                base: base.to_string(),
                origin: None,
            });
        }

        let origin = origin.ok_or_else(|| {
            AgentServiceError::Config(format!(
                "base URL '{}' is relative and no origin is configured",
                base
            ))
        })?;
        let origin = Url::parse(origin).map_err(|e| {
            AgentServiceError::Config(format!("invalid origin '{}': {}", origin, e))
        })?;
        check_http_base(&origin, "origin")?;

        let prefix = if base.starts_with('/') {
            base.to_string()
        } else {
            format!("/{}", base)
        };

        Ok(Self {
            base: prefix,
            origin: Some(origin),
        })
    }

    /// The base as configured (absolute URL or path prefix).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Relative target for `path`, as produced by [`build_target`].
    pub fn target(&self, path: &str, query: &[(&str, &str)]) -> String {
        build_target(&self.base, path, query)
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, AgentServiceError> {
        let target = self.target(path, query);
        let resolved = match &self.origin {
            Some(origin) => origin.join(&target),
            None => Url::parse(&target),
        };
        resolved.map_err(|e| AgentServiceError::Config(format!("invalid target '{}': {}", target, e)))
    }
}

fn check_http_base(url: &Url, what: &str) -> Result<(), AgentServiceError> {
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(AgentServiceError::Config(format!(
            "{} '{}' is not an http(s) URL",
            what, url
        )));
    }
    Ok(())
}
