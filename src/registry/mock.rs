//! Recording collaborators for testing.
//!
//! `MockCollaborators` implements all three registry traits and records every
//! call so tests can assert exactly which side effects an event produced.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Registration, Resource, ResourceRegistry, ResourceSource, ServingIndex};
use crate::error::SyncError;
use crate::events::ResourceKind;

/// A recorded collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load { kind: ResourceKind, id: String },
    Register { kind: ResourceKind, domain: String, id: String },
    Unregister { kind: ResourceKind, domain: String, id: String },
    Add { kind: ResourceKind, id: String },
    Remove { kind: ResourceKind, id: String },
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    load_failure: Option<SyncError>,
    register_failure: Option<SyncError>,
    registered: HashMap<String, bool>,
    versions: HashMap<String, u64>,
}

/// Source, registry and index in one recording mock.
pub struct MockCollaborators {
    state: Mutex<MockState>,
    load_gate: Option<Arc<Notify>>,
}

impl Default for MockCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCollaborators {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            load_gate: None,
        }
    }

    /// Hold every load until the returned handle is notified.
    pub fn with_load_gate(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.load_gate = Some(gate.clone());
        (self, gate)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_load_failure(&self, err: SyncError) {
        self.state().load_failure = Some(err);
    }

    pub fn set_register_failure(&self, err: SyncError) {
        self.state().register_failure = Some(err);
    }

    /// Outcome register reports for `id` (defaults to `true`).
    pub fn set_registered(&self, id: &str, registered: bool) {
        self.state().registered.insert(id.to_string(), registered);
    }

    /// Version load returns for `id` (defaults to 1).
    pub fn set_version(&self, id: &str, version: u64) {
        self.state().versions.insert(id.to_string(), version);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(*c)).count()
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl ResourceSource for MockCollaborators {
    async fn load(&self, kind: ResourceKind, id: &str) -> Result<Resource, SyncError> {
        self.record(Call::Load {
            kind,
            id: id.to_string(),
        });

        if let Some(gate) = &self.load_gate {
            gate.notified().await;
        }

        let state = self.state();
        if let Some(err) = &state.load_failure {
            return Err(err.clone());
        }
        let version = state.versions.get(id).copied().unwrap_or(1);
        Ok(Resource::new(id, version))
    }
}

#[async_trait]
impl ResourceRegistry for MockCollaborators {
    async fn register(
        &self,
        kind: ResourceKind,
        domain: &str,
        resource: &Resource,
    ) -> Result<Registration, SyncError> {
        self.record(Call::Register {
            kind,
            domain: domain.to_string(),
            id: resource.id.clone(),
        });

        let state = self.state();
        if let Some(err) = &state.register_failure {
            return Err(err.clone());
        }
        let registered = state.registered.get(&resource.id).copied().unwrap_or(true);
        Ok(Registration { registered })
    }

    fn unregister(&self, kind: ResourceKind, domain: &str, id: &str) {
        self.record(Call::Unregister {
            kind,
            domain: domain.to_string(),
            id: id.to_string(),
        });
    }
}

impl ServingIndex for MockCollaborators {
    fn add(&self, kind: ResourceKind, resource: Resource) {
        self.record(Call::Add {
            kind,
            id: resource.id,
        });
    }

    fn remove(&self, kind: ResourceKind, id: &str) {
        self.record(Call::Remove {
            kind,
            id: id.to_string(),
        });
    }
}
