//! Registry collaborators.
//!
//! This module contains:
//! - `ResourceSource` trait: loads a resource's full content by id
//! - `ResourceRegistry` trait: domain-scoped record of active resources,
//!   sole arbiter of which version wins
//! - `ServingIndex` trait: structure requests are served from
//! - Implementations: HTTP store, in-memory registry/index, recording mock

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::events::ResourceKind;

pub mod http;
pub mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use http::HttpResourceSource;
pub use memory::{InMemoryIndex, InMemoryRegistry};

/// Loaded resource content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    /// Monotonic revision used for last-writer-wins.
    #[serde(default)]
    pub version: u64,
    /// Remaining document fields, opaque to the worker.
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl Resource {
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            body: serde_json::Map::new(),
        }
    }
}

/// Outcome of a register call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Registration {
    /// `false` when the registry kept a different version.
    pub registered: bool,
}

impl Registration {
    pub fn accepted() -> Self {
        Self { registered: true }
    }

    pub fn rejected() -> Self {
        Self { registered: false }
    }
}

/// Source of truth for resource content.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn load(&self, kind: ResourceKind, id: &str) -> Result<Resource, SyncError>;
}

/// Domain-scoped registry of active resources.
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Register a loaded resource. The registry decides whether it wins.
    async fn register(
        &self,
        kind: ResourceKind,
        domain: &str,
        resource: &Resource,
    ) -> Result<Registration, SyncError>;

    /// Drop a resource. No I/O; completes before returning.
    fn unregister(&self, kind: ResourceKind, domain: &str, id: &str);
}

/// Structure that serves registered resources.
pub trait ServingIndex: Send + Sync {
    fn add(&self, kind: ResourceKind, resource: Resource);

    fn remove(&self, kind: ResourceKind, id: &str);
}
