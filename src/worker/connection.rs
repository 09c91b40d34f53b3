//! Broker connection lifecycle.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Closing -> Disconnected
//!                     |             |
//!                     |             +-- broker error: Disconnected, close, full restart
//!                     +-- connect error: Disconnected, retry after fixed delay
//! ```
//!
//! A subscription failure closes the connection and ends the run with an
//! error; a worker that cannot subscribe is useless.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{
    Broker, BrokerConnection, ChannelBinder, ConnectionState, LifecycleEvent, SessionEnd,
    WorkerIdentity,
};
use crate::error::Result;

/// Owns the broker connection and restarts it on failure.
pub struct ConnectionManager {
    identity: WorkerIdentity,
    broker: Arc<dyn Broker>,
    binder: ChannelBinder,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl ConnectionManager {
    pub fn new(
        identity: WorkerIdentity,
        broker: Arc<dyn Broker>,
        binder: ChannelBinder,
        reconnect_delay: Duration,
        state: watch::Sender<ConnectionState>,
        transitions: broadcast::Sender<ConnectionState>,
        lifecycle: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            identity,
            broker,
            binder,
            reconnect_delay,
            state,
            transitions,
            lifecycle,
        }
    }

    pub fn queue(&self) -> &str {
        &self.binder.subscription().queue
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        let _ = self.transitions.send(state);
    }

    /// Connect, subscribe and consume; restart from scratch on broker errors.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(worker_id = %self.identity, "Creating worker");

        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                result = self.broker.connect() => result,
            };

            let connection = match connected {
                Ok(connection) => connection,
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    error!(
                        worker_id = %self.identity,
                        error = %e,
                        retry_in_ms = %self.reconnect_delay.as_millis(),
                        "Worker connection failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.reconnect_delay) => continue,
                    }
                }
            };

            let deliveries = match self.binder.bind(connection.as_ref()).await {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    error!(
                        worker_id = %self.identity,
                        error = %e,
                        "Worker subscription failed, closing connection"
                    );
                    self.close(connection.as_ref()).await;
                    return Err(e);
                }
            };

            self.set_state(ConnectionState::Connected);
            info!(worker_id = %self.identity, queue = %self.queue(), "Worker up");
            let _ = self.lifecycle.send(LifecycleEvent::Ready {
                worker_id: self.identity,
                queue: self.queue().to_string(),
            });

            match self.binder.consume(deliveries, &shutdown).await {
                SessionEnd::Shutdown => {
                    warn!(worker_id = %self.identity, "Closing broker connection");
                    self.close(connection.as_ref()).await;
                    return Ok(());
                }
                SessionEnd::Broken(reason) => {
                    error!(
                        worker_id = %self.identity,
                        error = %reason,
                        "Broker connection lost, restarting worker"
                    );
                    self.set_state(ConnectionState::Disconnected);
                    // A cancelled consumer can leave the connection up.
                    connection.close().await;
                }
            }
        }
    }

    async fn close(&self, connection: &dyn BrokerConnection) {
        self.set_state(ConnectionState::Closing);
        connection.close().await;
        self.set_state(ConnectionState::Disconnected);
    }
}
