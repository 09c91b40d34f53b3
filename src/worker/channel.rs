//! Worker queue provisioning and consumption.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{BrokerConnection, DeliveryStream, WorkerIdentity};
use crate::dispatch::EventDispatcher;
use crate::error::{Result, WorkerError};

/// Binding pattern that receives every event on the exchange.
const RECEIVE_ALL: &str = "";

/// Worker-scoped queue bound to the event exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub queue: String,
    pub exchange: String,
    pub pattern: String,
    pub durable: bool,
    pub auto_delete: bool,
}

impl Subscription {
    /// Non-durable, auto-deleted queue `<prefix><worker id>` receiving all events.
    pub fn for_worker(prefix: &str, identity: WorkerIdentity, exchange: &str) -> Self {
        Self {
            queue: format!("{}{}", prefix, identity),
            exchange: exchange.to_string(),
            pattern: RECEIVE_ALL.to_string(),
            durable: false,
            auto_delete: true,
        }
    }
}

/// Why a consuming session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shutdown was requested.
    Shutdown,
    /// The connection failed or the consumer stopped.
    Broken(String),
}

/// Sets up the worker subscription and hands deliveries to the dispatcher.
pub struct ChannelBinder {
    subscription: Subscription,
    dispatcher: Arc<EventDispatcher>,
}

impl ChannelBinder {
    pub fn new(subscription: Subscription, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            subscription,
            dispatcher,
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Open a channel, declare and bind the queue, and start consuming.
    ///
    /// Every failure is a [`WorkerError::Subscription`].
    pub async fn bind(&self, connection: &dyn BrokerConnection) -> Result<DeliveryStream> {
        let sub = &self.subscription;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| subscription_error("create channel", e))?;

        channel
            .declare_queue(&sub.queue, sub.durable, sub.auto_delete)
            .await
            .map_err(|e| subscription_error("declare queue", e))?;

        channel
            .bind_queue(&sub.queue, &sub.exchange, &sub.pattern)
            .await
            .map_err(|e| subscription_error("bind queue", e))?;

        info!(
            queue = %sub.queue,
            exchange = %sub.exchange,
            "Bound queue to exchange"
        );

        channel
            .consume(&sub.queue, &sub.queue)
            .await
            .map_err(|e| subscription_error("start consumer", e))
    }

    /// Feed deliveries to the dispatcher until shutdown or connection failure.
    pub async fn consume(
        &self,
        mut deliveries: DeliveryStream,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        let outcome = self.dispatcher.dispatch(&delivery);
                        debug!(routing_key = %delivery.routing_key, outcome = ?outcome, "Delivery handled");
                    }
                    Some(Err(e)) => return SessionEnd::Broken(e.to_string()),
                    None => return SessionEnd::Broken("consumer stream ended".to_string()),
                },
            }
        }
    }
}

fn subscription_error(step: &str, err: WorkerError) -> WorkerError {
    match err {
        WorkerError::Subscription(_) => err,
        other => WorkerError::Subscription(format!("Failed to {}: {}", step, other)),
    }
}
