//! In-memory registry and serving index.
//!
//! The registry keeps one entry per (kind, domain, id) and applies
//! last-writer-wins on [`Resource::version`]: registering an older version
//! than the one held reports `registered: false` and changes nothing.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{Registration, Resource, ResourceRegistry, ServingIndex};
use crate::error::SyncError;
use crate::events::ResourceKind;

type DomainKey = (ResourceKind, String);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Domain-scoped registry held in process memory.
#[derive(Default)]
pub struct InMemoryRegistry {
    domains: RwLock<HashMap<DomainKey, HashMap<String, Resource>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind, domain: &str, id: &str) -> Option<Resource> {
        read(&self.domains)
            .get(&(kind, domain.to_string()))
            .and_then(|entries| entries.get(id))
            .cloned()
    }

    /// Number of resources registered for a domain.
    pub fn count(&self, kind: ResourceKind, domain: &str) -> usize {
        read(&self.domains)
            .get(&(kind, domain.to_string()))
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl ResourceRegistry for InMemoryRegistry {
    async fn register(
        &self,
        kind: ResourceKind,
        domain: &str,
        resource: &Resource,
    ) -> Result<Registration, SyncError> {
        let mut domains = write(&self.domains);
        let entries = domains.entry((kind, domain.to_string())).or_default();

        if let Some(current) = entries.get(&resource.id) {
            if current.version > resource.version {
                debug!(
                    resource_id = %resource.id,
                    held = current.version,
                    offered = resource.version,
                    "Newer version already registered"
                );
                return Ok(Registration::rejected());
            }
        }

        entries.insert(resource.id.clone(), resource.clone());
        Ok(Registration::accepted())
    }

    fn unregister(&self, kind: ResourceKind, domain: &str, id: &str) {
        let mut domains = write(&self.domains);
        let key = (kind, domain.to_string());
        if let Some(entries) = domains.get_mut(&key) {
            entries.remove(id);
            if entries.is_empty() {
                domains.remove(&key);
            }
        }
    }
}

/// Serving index held in process memory.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<(ResourceKind, String), Resource>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind, id: &str) -> Option<Resource> {
        read(&self.entries).get(&(kind, id.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServingIndex for InMemoryIndex {
    fn add(&self, kind: ResourceKind, resource: Resource) {
        write(&self.entries).insert((kind, resource.id.clone()), resource);
    }

    fn remove(&self, kind: ResourceKind, id: &str) {
        write(&self.entries).remove(&(kind, id.to_string()));
    }
}
