//! Broker and worker configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Exchange every resource event is published on.
pub const DEFAULT_EXCHANGE: &str = "eventbus.exchange";

/// AMQP-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    /// URI scheme (`amqp` or `amqps`).
    pub scheme: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Keep-alive interval negotiated with the broker.
    pub heartbeat_secs: u16,
    /// Fixed delay before retrying a failed connection attempt.
    pub reconnect_delay_ms: u64,
    /// Fan-out exchange the worker queue is bound to.
    pub exchange: String,
    /// Routing key of resource events; anything else is ignored.
    pub event: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            scheme: "amqp".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            host: "localhost".to_string(),
            port: 5672,
            heartbeat_secs: 30,
            reconnect_delay_ms: 10_000,
            exchange: DEFAULT_EXCHANGE.to_string(),
            event: "eventbus.event".to_string(),
        }
    }
}

impl AmqpConfig {
    /// Connection URI with percent-encoded credentials.
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}?heartbeat={}",
            self.scheme,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.heartbeat_secs
        )
    }

    /// Same as [`AmqpConfig::url`] with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        format!(
            "{}://{}:***@{}:{}?heartbeat={}",
            self.scheme,
            urlencoding::encode(&self.username),
            self.host,
            self.port,
            self.heartbeat_secs
        )
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Worker-scoped settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Prefix of the worker queue name; the worker identity is appended.
    pub server_name: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            server_name: "eventsync-".to_string(),
        }
    }
}
