//! Event dispatch.
//!
//! Filters deliveries by routing key and resource type, decodes the body and
//! hands a normalized [`ResourceEvent`] to [`RegistrySync`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::Result;
use crate::events::{EventMessage, KindMatcher, ResourceEvent};
use crate::sync::RegistrySync;
use crate::worker::Delivery;

/// What happened to a delivery.
#[derive(Debug)]
pub enum Dispatch {
    /// Routing key is not the resource event key.
    IgnoredRoutingKey,
    /// `type` is neither resource kind.
    IgnoredKind,
    /// Applied before returning (deletes, unrecognized actions).
    Applied,
    /// Running on its own task.
    Spawned(JoinHandle<()>),
    /// Body could not be decoded; logged and discarded.
    Rejected,
}

/// Routes deliveries to registry sync.
pub struct EventDispatcher {
    event_key: String,
    kinds: KindMatcher,
    sync: Arc<RegistrySync>,
}

impl EventDispatcher {
    pub fn new(event_key: impl Into<String>, kinds: KindMatcher, sync: Arc<RegistrySync>) -> Self {
        Self {
            event_key: event_key.into(),
            kinds,
            sync,
        }
    }

    /// Filter and decode a delivery.
    ///
    /// Returns `Ok(None)` for deliveries that are not resource events.
    pub fn route(&self, delivery: &Delivery) -> Result<Option<ResourceEvent>> {
        if delivery.routing_key != self.event_key {
            return Ok(None);
        }

        let message = EventMessage::decode(&delivery.body)?;
        let Some(kind) = message.kind().and_then(|kind| self.kinds.kind_of(kind)) else {
            return Ok(None);
        };

        let resource_id = message.resource_id()?;
        let action = message.action();

        debug!(
            kind = %kind,
            resource_id = %resource_id,
            action = %action,
            "Resource event"
        );
        Ok(Some(ResourceEvent::new(kind, resource_id, action)))
    }

    /// Route a delivery and apply it.
    pub fn handle(&self, delivery: &Delivery) -> Result<Dispatch> {
        if delivery.routing_key != self.event_key {
            return Ok(Dispatch::IgnoredRoutingKey);
        }

        match self.route(delivery)? {
            None => Ok(Dispatch::IgnoredKind),
            Some(event) => Ok(match self.sync.apply(event) {
                Some(handle) => Dispatch::Spawned(handle),
                None => Dispatch::Applied,
            }),
        }
    }

    /// Consumer entry point: like [`EventDispatcher::handle`] but never fails.
    ///
    /// Deliveries are auto-acknowledged, so a bad body is logged and dropped.
    pub fn dispatch(&self, delivery: &Delivery) -> Dispatch {
        match self.handle(delivery) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                let (code, status) = e.code_and_status().unwrap_or(("", 0));
                error!(
                    routing_key = %delivery.routing_key,
                    code = %code,
                    status = status,
                    error = %e,
                    "Discarding malformed event"
                );
                Dispatch::Rejected
            }
        }
    }
}
