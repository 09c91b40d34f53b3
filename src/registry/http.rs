//! HTTP resource source.
//!
//! Loads resources from the store with
//! `GET {base_url}/resource/{type}/{id}`. Error responses carry
//! `{"error": ..., "errorDescription": ...}` bodies which are surfaced as
//! [`SyncError`] together with the response status.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Resource, ResourceSource};
use crate::config::ResourceConfig;
use crate::error::SyncError;
use crate::events::{KindMatcher, ResourceKind};

/// Resource source backed by the store's REST API.
pub struct HttpResourceSource {
    client: Client,
    base_url: String,
    token: Option<String>,
    kinds: KindMatcher,
}

impl HttpResourceSource {
    pub fn new(config: &ResourceConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            kinds: KindMatcher::from_config(config),
        })
    }

    fn resource_url(&self, kind: ResourceKind, id: &str) -> String {
        format!(
            "{}/resource/{}/{}",
            self.base_url,
            self.kinds.type_name(kind),
            urlencoding::encode(id)
        )
    }

    /// Map a non-2xx response to a structured error.
    fn error_from_body(status: u16, body: &str) -> SyncError {
        match serde_json::from_str::<SyncError>(body) {
            Ok(mut err) => {
                err.status = status;
                err
            }
            Err(_) => SyncError::new(
                "error:resource:load",
                body.chars().take(200).collect::<String>(),
                status,
            ),
        }
    }
}

#[async_trait]
impl ResourceSource for HttpResourceSource {
    async fn load(&self, kind: ResourceKind, id: &str) -> Result<Resource, SyncError> {
        let url = self.resource_url(kind, id);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error_from_body(status.as_u16(), &body));
        }

        let resource: Resource = response
            .json()
            .await
            .map_err(|e| SyncError::unavailable(format!("invalid resource body: {}", e)))?;

        debug!(url = %url, resource_id = %resource.id, "Resource loaded");
        Ok(resource)
    }
}
