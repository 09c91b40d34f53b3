//! AMQP (RabbitMQ) broker implementation.
//!
//! The worker queue is bound to a fan-out exchange with an empty pattern and
//! consumed with `no_ack`, so deliveries are acknowledged on receipt.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::sync::watch;
use tracing::{error, info};

use super::{Broker, BrokerChannel, BrokerConnection, Delivery, DeliveryStream};
use crate::config::AmqpConfig;
use crate::error::{Result, WorkerError};

/// Reply code for a normal connection close.
const REPLY_SUCCESS: u16 = 200;

/// Broker reached through an AMQP URI built from configuration.
pub struct AmqpBroker {
    url: String,
    redacted_url: String,
}

impl AmqpBroker {
    pub fn new(config: &AmqpConfig) -> Self {
        Self {
            url: config.url(),
            redacted_url: config.redacted_url(),
        }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| WorkerError::Connection(format!("Failed to connect: {}", e)))?;

        // Connection errors end every consumer on this connection.
        let (failed_tx, failed) = watch::channel(None);
        connection.on_error(move |e| {
            error!(error = %e, "AMQP connection error");
            let _ = failed_tx.send(Some(e.to_string()));
        });

        info!(url = %self.redacted_url, "Connected to AMQP");

        Ok(Box::new(AmqpConnection { connection, failed }))
    }
}

struct AmqpConnection {
    connection: Connection,
    failed: watch::Receiver<Option<String>>,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| WorkerError::Subscription(format!("Failed to create channel: {}", e)))?;

        Ok(Box::new(AmqpChannel {
            channel,
            failed: self.failed.clone(),
        }))
    }

    async fn close(&self) {
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "worker shutdown").await {
            error!(error = %e, "Failed to close AMQP connection");
        }
    }
}

struct AmqpChannel {
    channel: Channel,
    failed: watch::Receiver<Option<String>>,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, queue: &str, durable: bool, auto_delete: bool) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable,
                    auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| WorkerError::Subscription(format!("Failed to declare queue: {}", e)))?;
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| WorkerError::Subscription(format!("Failed to bind queue: {}", e)))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| WorkerError::Subscription(format!("Failed to start consumer: {}", e)))?;

        // The stream carries a channel handle so the channel outlives the binder.
        let deliveries = futures::stream::unfold(
            (consumer, self.channel.clone()),
            |(mut consumer, channel)| async move {
                let delivery = consumer
                    .next()
                    .await?
                    .map(|d| Delivery {
                        routing_key: d.routing_key.as_str().to_string(),
                        body: d.data,
                    })
                    .map_err(|e| WorkerError::Connection(e.to_string()));
                Some((delivery, (consumer, channel)))
            },
        )
        .chain(futures::stream::once(futures::future::ready(Err::<Delivery, _>(
            WorkerError::Connection("consumer cancelled".to_string()),
        ))));

        let mut failed = self.failed.clone();
        let failure = futures::stream::once(async move {
            let reason = failed
                .wait_for(Option::is_some)
                .await
                .map(|reason| reason.clone().unwrap_or_default())
                .unwrap_or_else(|_| "connection dropped".to_string());
            Err::<Delivery, _>(WorkerError::Connection(reason))
        });

        Ok(futures::stream::select(deliveries, failure).boxed())
    }
}
