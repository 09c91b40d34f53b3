//! Resource store configuration.

use std::time::Duration;

use serde::Deserialize;

/// Resource kinds and where their content is loaded from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// `type` value identifying phrase events.
    pub phrase_type: String,
    /// `type` value identifying snippet events.
    pub snippet_type: String,
    /// Base URL of the resource store.
    pub base_url: String,
    /// Bearer token sent with every load request.
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            phrase_type: "composr:Phrase".to_string(),
            snippet_type: "composr:Snippet".to_string(),
            base_url: "http://localhost:8080".to_string(),
            token: None,
            request_timeout_secs: 30,
        }
    }
}

impl ResourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
