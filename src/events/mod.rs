//! Resource event wire format.
//!
//! Events announce that a phrase or snippet changed in the resource store.
//! The body is UTF-8 JSON:
//!
//! ```text
//! { "type": "composr:Phrase", "resourceId": "acme!42", "action": "CREATE" }
//! ```
//!
//! The part of `resourceId` before the first `!` is the owning domain.

use std::fmt;

use serde_json::Value;

use crate::config::ResourceConfig;
use crate::error::{Result, WorkerError};

/// Separator between the domain and the local part of a resource id.
pub const DOMAIN_SEPARATOR: char = '!';

/// The two resource kinds kept in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Phrase,
    Snippet,
}

impl ResourceKind {
    pub fn is_phrase(self) -> bool {
        self == ResourceKind::Phrase
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Phrase => f.write_str("phrase"),
            ResourceKind::Snippet => f.write_str("snippet"),
        }
    }
}

/// Operation announced by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
    /// Anything else; logged and skipped.
    Unrecognized(String),
}

impl Action {
    pub fn parse(value: &str) -> Self {
        match value {
            "CREATE" => Action::Create,
            "UPDATE" => Action::Update,
            "DELETE" => Action::Delete,
            other => Action::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => f.write_str("CREATE"),
            Action::Update => f.write_str("UPDATE"),
            Action::Delete => f.write_str("DELETE"),
            Action::Unrecognized(other) => f.write_str(other),
        }
    }
}

/// Event body as published on the exchange.
///
/// Other producers share the exchange, so the body is only required to be
/// JSON. Fields are read leniently and checked once the kind is known.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage(Value);

impl EventMessage {
    /// Decode a UTF-8 JSON body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let text =
            std::str::from_utf8(body).map_err(|e| WorkerError::MessageFormat(e.to_string()))?;
        serde_json::from_str(text)
            .map(Self)
            .map_err(|e| WorkerError::MessageFormat(e.to_string()))
    }

    /// The `type` field, if it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The `resourceId` field; must be a non-empty string.
    pub fn resource_id(&self) -> Result<&str> {
        match self.0.get("resourceId") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.as_str()),
            Some(Value::String(_)) | None | Some(Value::Null) => Err(
                WorkerError::MessageFormat("missing resourceId".to_string()),
            ),
            Some(other) => Err(WorkerError::MessageFormat(format!(
                "resourceId must be a string, got {}",
                other
            ))),
        }
    }

    /// The `action` field. Missing or non-string values are unrecognized.
    pub fn action(&self) -> Action {
        match self.0.get("action") {
            Some(Value::String(action)) => Action::parse(action),
            Some(other) => Action::Unrecognized(other.to_string()),
            None => Action::Unrecognized(String::new()),
        }
    }
}

/// Normalized event handed to registry sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    pub kind: ResourceKind,
    pub resource_id: String,
    pub domain: String,
    pub action: Action,
}

impl ResourceEvent {
    pub fn new(kind: ResourceKind, resource_id: impl Into<String>, action: Action) -> Self {
        let resource_id = resource_id.into();
        let domain = domain_of(&resource_id).to_string();
        Self {
            kind,
            resource_id,
            domain,
            action,
        }
    }
}

/// Domain owning a resource: everything before the first `!`.
///
/// An id without a separator is its own domain.
pub fn domain_of(resource_id: &str) -> &str {
    resource_id
        .split_once(DOMAIN_SEPARATOR)
        .map_or(resource_id, |(domain, _)| domain)
}

/// Maps the `type` field of an event to a [`ResourceKind`].
#[derive(Debug, Clone)]
pub struct KindMatcher {
    phrase_type: String,
    snippet_type: String,
}

impl KindMatcher {
    pub fn new(phrase_type: impl Into<String>, snippet_type: impl Into<String>) -> Self {
        Self {
            phrase_type: phrase_type.into(),
            snippet_type: snippet_type.into(),
        }
    }

    pub fn from_config(config: &ResourceConfig) -> Self {
        Self::new(&config.phrase_type, &config.snippet_type)
    }

    pub fn kind_of(&self, kind: &str) -> Option<ResourceKind> {
        if kind == self.phrase_type {
            Some(ResourceKind::Phrase)
        } else if kind == self.snippet_type {
            Some(ResourceKind::Snippet)
        } else {
            None
        }
    }

    /// Store collection name for a kind.
    pub fn type_name(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Phrase => &self.phrase_type,
            ResourceKind::Snippet => &self.snippet_type,
        }
    }
}

impl Default for KindMatcher {
    fn default() -> Self {
        Self::from_config(&ResourceConfig::default())
    }
}

#[cfg(test)]
mod tests;
