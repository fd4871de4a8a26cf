//! Request and response models for the ask service.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use serde_with::{skip_serializing_none, As, DefaultOnNull};
use thiserror::Error;

/// Errors raised while constructing a query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidQuery {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// Answer language understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
}

impl Language {
    /// Token sent on the wire as the `lang` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = InvalidQuery;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            other => Err(InvalidQuery::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// A question plus the optional selectors that scope it.
///
/// Values are immutable once built; the `with_*` methods return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryParameters {
    question: String,
    thread_id: Option<String>,
    language: Option<Language>,
    provider: Option<String>,
    model: Option<String>,
}

impl QueryParameters {
    /// Create a query for a new conversation.
    ///
    /// Fails if the question is empty or whitespace only.
    pub fn new(question: impl Into<String>) -> Result<Self, InvalidQuery> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(InvalidQuery::EmptyQuestion);
        }
        Ok(Self {
            question,
            thread_id: None,
            language: None,
            provider: None,
            model: None,
        })
    }

    /// Continue an existing conversation thread.
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Query-string pairs in wire order. Absent values are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![("question", self.question.as_str())];
        if let Some(thread_id) = &self.thread_id {
            pairs.push(("thread_id", thread_id));
        }
        if let Some(language) = self.language {
            pairs.push(("lang", language.as_str()));
        }
        if let Some(provider) = &self.provider {
            pairs.push(("provider", provider));
        }
        if let Some(model) = &self.model {
            pairs.push(("model", model));
        }
        pairs
    }
}

/// A citation backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
    pub content: String,

    /// Relevance in `[0, 1]`.
    #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
    pub similarity: f64,

    /// Any other fields the service attaches (title, url, page, ...).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// A fully materialized answer.
///
/// Fields the service omits or sends as `null` decode to their empty value.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
    pub answer: String,

    #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
    pub sources: Vec<Source>,

    /// Present when the server assigned or continued a thread.
    #[serde(default, alias = "threadId")]
    pub thread_id: Option<String>,
}

/// One event pushed by the server over the ask stream.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Progress report while the agent works.
    #[serde(alias = "progress")]
    Thinking {
        #[serde(default, alias = "content", deserialize_with = "As::<DefaultOnNull>::deserialize")]
        message: String,
        /// Percentage in `[0, 100]`.
        #[serde(default)]
        progress: Option<f64>,
        #[serde(default)]
        stage: Option<String>,
    },

    /// The agent needs more input before it can answer.
    #[serde(alias = "clarification-request")]
    ClarificationRequest {
        #[serde(default, alias = "prompt", deserialize_with = "As::<DefaultOnNull>::deserialize")]
        message: String,
        #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
        questions: Vec<String>,
    },

    /// Final answer. Terminal.
    Complete(AgentResponse),

    /// Server-declared failure. Terminal.
    Error {
        #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
        message: String,
        #[serde(default)]
        code: Option<String>,
        #[serde(default, alias = "statusCode")]
        status_code: Option<u16>,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete(_) | StreamEvent::Error { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::ClarificationRequest { .. } => "clarification_request",
            StreamEvent::Complete(_) => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// A selectable backend provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub key: String,
    #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
    pub label: String,
}

/// Provider and model catalog served by the config endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
    pub providers: Vec<ProviderInfo>,

    /// Model names keyed by provider key.
    #[serde(default, deserialize_with = "As::<DefaultOnNull>::deserialize")]
    pub models: BTreeMap<String, Vec<String>>,
}

impl AgentConfig {
    pub fn models_for(&self, provider: &str) -> &[String] {
        self.models.get(provider).map(Vec::as_slice).unwrap_or_default()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}
