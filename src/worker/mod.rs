//! Worker lifecycle.
//!
//! This module contains:
//! - `Broker` / `BrokerConnection` / `BrokerChannel` traits: transport seam
//! - `ChannelBinder`: provisions the worker queue and feeds the dispatcher
//! - `ConnectionManager`: connect, retry, restart and shutdown
//! - `Worker`: wires the above together from configuration
//! - Implementations: AMQP (RabbitMQ), in-memory

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::EventDispatcher;
use crate::error::Result;
use crate::events::KindMatcher;
use crate::sync::RegistrySync;

#[cfg(feature = "amqp")]
pub mod amqp;
mod channel;
mod connection;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use channel::{ChannelBinder, SessionEnd, Subscription};
pub use connection::ConnectionManager;

/// Capacity of the lifecycle broadcast channel.
const LIFECYCLE_CAPACITY: usize = 16;

/// Capacity of the state transition broadcast channel.
const TRANSITION_CAPACITY: usize = 64;

// ============================================================================
// Identity and state
// ============================================================================

/// Process-unique worker id; names the worker's private queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerIdentity(Uuid);

impl WorkerIdentity {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Broker connection state. Only [`ConnectionManager`] writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Lifecycle notifications for code outside the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Subscription established; the worker is consuming.
    Ready {
        worker_id: WorkerIdentity,
        queue: String,
    },
}

// ============================================================================
// Transport traits
// ============================================================================

/// A message delivered on the worker queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
}

/// Deliveries from an auto-ack consumer. An `Err` item means the connection
/// failed; the stream ending means the same.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Opens broker connections.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>>;
}

/// A live broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>>;

    /// Close the connection. Errors are logged by the implementation.
    async fn close(&self);
}

/// A channel on a broker connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn declare_queue(&self, queue: &str, durable: bool, auto_delete: bool) -> Result<()>;

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()>;

    /// Start consuming with automatic acknowledgment.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;
}

// ============================================================================
// Worker
// ============================================================================

/// Event bus worker keeping the registry in sync.
pub struct Worker {
    identity: WorkerIdentity,
    manager: ConnectionManager,
    state: watch::Receiver<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl Worker {
    pub fn new(config: &Config, broker: Arc<dyn Broker>, sync: Arc<RegistrySync>) -> Self {
        let identity = WorkerIdentity::generate();

        let dispatcher = Arc::new(EventDispatcher::new(
            config.amqp.event.clone(),
            KindMatcher::from_config(&config.resources),
            sync,
        ));
        let subscription =
            Subscription::for_worker(&config.worker.server_name, identity, &config.amqp.exchange);
        let binder = ChannelBinder::new(subscription, dispatcher);

        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CAPACITY);

        let manager = ConnectionManager::new(
            identity,
            broker,
            binder,
            config.amqp.reconnect_delay(),
            state_tx,
            transitions.clone(),
            lifecycle.clone(),
        );

        Self {
            identity,
            manager,
            state,
            transitions,
            lifecycle,
        }
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    /// Name of the worker's private queue.
    pub fn queue(&self) -> &str {
        self.manager.queue()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receive every state change in order.
    ///
    /// Unlike [`Worker::watch_state`], intermediate states are not coalesced.
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    /// Receive lifecycle notifications.
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Run until `shutdown` is cancelled or the subscription cannot be set up.
    ///
    /// Returns `Ok(())` after a graceful close and
    /// `Err(WorkerError::Subscription)` on the fail-fast path.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.manager.run(shutdown).await
    }
}

#[cfg(test)]
mod tests;
