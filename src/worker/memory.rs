//! In-memory broker for testing.
//!
//! Mimics a fan-out exchange: every published message reaches the consumer
//! of the most recent live connection. Connection and subscription failures
//! can be injected to exercise the worker lifecycle.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::{Broker, BrokerChannel, BrokerConnection, Delivery, DeliveryStream};
use crate::error::{Result, WorkerError};

type Sender = mpsc::UnboundedSender<Result<Delivery>>;

#[derive(Default)]
struct BrokerState {
    failing_connects: usize,
    failing_binds: bool,
    connects: usize,
    closes: usize,
    declared: Vec<DeclaredQueue>,
    bindings: Vec<Binding>,
    consumer: Option<Sender>,
}

/// A queue declaration seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueue {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
}

/// A queue binding seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub exchange: String,
    pub pattern: String,
}

/// In-memory broker with failure injection.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        lock(&self.state).failing_connects = count;
    }

    /// Refuse queue bindings.
    pub fn fail_binds(&self, fail: bool) {
        lock(&self.state).failing_binds = fail;
    }

    /// Publish to the live consumer. Returns `false` if nobody is consuming.
    pub fn publish(&self, routing_key: &str, body: impl Into<Vec<u8>>) -> bool {
        let delivery = Delivery {
            routing_key: routing_key.to_string(),
            body: body.into(),
        };
        match &lock(&self.state).consumer {
            Some(consumer) => consumer.send(Ok(delivery)).is_ok(),
            None => false,
        }
    }

    /// Fail the live connection, as a broker-side error would.
    pub fn drop_connection(&self) {
        if let Some(consumer) = lock(&self.state).consumer.take() {
            let _ = consumer.send(Err(WorkerError::Connection(
                "connection reset by broker".to_string(),
            )));
        }
    }

    /// Connection attempts, including refused ones.
    pub fn connects(&self) -> usize {
        lock(&self.state).connects
    }

    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    pub fn declared(&self) -> Vec<DeclaredQueue> {
        lock(&self.state).declared.clone()
    }

    pub fn bindings(&self) -> Vec<Binding> {
        lock(&self.state).bindings.clone()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>> {
        let mut state = lock(&self.state);
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(WorkerError::Connection("connection refused".to_string()));
        }
        Ok(Box::new(InMemoryConnection {
            state: self.state.clone(),
        }))
    }
}

struct InMemoryConnection {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        Ok(Box::new(InMemoryChannel {
            state: self.state.clone(),
        }))
    }

    async fn close(&self) {
        let mut state = lock(&self.state);
        state.closes += 1;
        state.consumer = None;
    }
}

struct InMemoryChannel {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare_queue(&self, queue: &str, durable: bool, auto_delete: bool) -> Result<()> {
        lock(&self.state).declared.push(DeclaredQueue {
            name: queue.to_string(),
            durable,
            auto_delete,
        });
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing_binds {
            return Err(WorkerError::Subscription(format!(
                "no exchange '{}'",
                exchange
            )));
        }
        state.bindings.push(Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
        });
        Ok(())
    }

    async fn consume(&self, _queue: &str, _consumer_tag: &str) -> Result<DeliveryStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).consumer = Some(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        })
        .boxed())
    }
}
