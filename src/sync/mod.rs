//! Registry synchronization.
//!
//! Applies a normalized [`ResourceEvent`] to the registry and the serving
//! index:
//!
//! - `DELETE` unregisters and removes inline, with no I/O.
//! - `CREATE`/`UPDATE` load the resource, register it, and add it to the
//!   serving index only when the registry reports `registered: true`. The
//!   registry is the only arbiter of which version wins; the index mirrors
//!   its decision.
//! - Any other action is logged and skipped.
//!
//! Load-or-register failures are logged with their code, description and
//! status, then dropped. Nothing is retried.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn, Instrument};

use crate::error::{Result, WorkerError};
use crate::events::{Action, ResourceEvent};
use crate::registry::{Registration, ResourceRegistry, ResourceSource, ServingIndex};

/// Keeps the registry and serving index in step with resource events.
pub struct RegistrySync {
    source: Arc<dyn ResourceSource>,
    registry: Arc<dyn ResourceRegistry>,
    index: Arc<dyn ServingIndex>,
}

impl RegistrySync {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        registry: Arc<dyn ResourceRegistry>,
        index: Arc<dyn ServingIndex>,
    ) -> Self {
        Self {
            source,
            registry,
            index,
        }
    }

    /// Apply an event.
    ///
    /// Deletes and unrecognized actions complete before this returns.
    /// Creates and updates run on their own task; the handle is returned so
    /// callers may await it, but dropping it does not cancel the work.
    pub fn apply(self: &Arc<Self>, event: ResourceEvent) -> Option<JoinHandle<()>> {
        match &event.action {
            Action::Delete => {
                self.remove(&event);
                None
            }
            Action::Create | Action::Update => {
                let this = Arc::clone(self);
                let span = tracing::debug_span!(
                    "registry.upsert",
                    kind = %event.kind,
                    resource_id = %event.resource_id,
                    domain = %event.domain
                );
                Some(tokio::spawn(
                    async move {
                        if let Err(e) = this.upsert(&event).await {
                            log_sync_failure(&event, &e);
                        }
                    }
                    .instrument(span),
                ))
            }
            Action::Unrecognized(action) => {
                warn!(
                    action = %action,
                    resource_id = %event.resource_id,
                    "Unrecognized event action"
                );
                None
            }
        }
    }

    /// Unregister a resource and drop it from the serving index.
    pub fn remove(&self, event: &ResourceEvent) {
        debug!(
            kind = %event.kind,
            resource_id = %event.resource_id,
            domain = %event.domain,
            "DELETE event"
        );
        self.registry
            .unregister(event.kind, &event.domain, &event.resource_id);
        self.index.remove(event.kind, &event.resource_id);
    }

    /// Load, register and, if the registry accepted it, index a resource.
    pub async fn upsert(&self, event: &ResourceEvent) -> Result<Registration> {
        debug!(
            kind = %event.kind,
            resource_id = %event.resource_id,
            domain = %event.domain,
            action = %event.action,
            "CREATE or UPDATE event"
        );

        let resource = self.source.load(event.kind, &event.resource_id).await?;
        debug!(resource_id = %resource.id, "Resource fetched");

        let registration = self
            .registry
            .register(event.kind, &event.domain, &resource)
            .await?;

        if registration.registered {
            self.index.add(event.kind, resource);
        }

        debug!(
            resource_id = %event.resource_id,
            registered = registration.registered,
            "Resource registration finished"
        );
        Ok(registration)
    }
}

fn log_sync_failure(event: &ResourceEvent, err: &WorkerError) {
    match err {
        WorkerError::RegistrySync(e) => error!(
            resource_id = %event.resource_id,
            domain = %event.domain,
            code = %e.code,
            description = %e.description,
            status = e.status,
            "Registry sync failed"
        ),
        other => error!(
            resource_id = %event.resource_id,
            domain = %event.domain,
            error = %other,
            "Registry sync failed"
        ),
    }
}
