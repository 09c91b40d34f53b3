//! Worker integration tests against RabbitMQ using testcontainers.
//!
//! Run with: cargo test --test worker_amqp --features amqp,test-utils -- --nocapture
//!
//! These tests spin up RabbitMQ in a container using testcontainers-rs.
//! No manual RabbitMQ setup required.

use std::sync::Arc;
use std::time::Duration;

use eventsync::config::{Config, DEFAULT_EXCHANGE};
use eventsync::events::ResourceKind;
use eventsync::registry::mock::{Call, MockCollaborators};
use eventsync::sync::RegistrySync;
use eventsync::worker::{AmqpBroker, ConnectionState, LifecycleEvent, Worker};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Connection, ConnectionProperties, ExchangeKind,
};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};
use tokio_util::sync::CancellationToken;

const EVENT_KEY: &str = "eventbus.event";

/// Start RabbitMQ container.
///
/// Returns (container, config) where config points the worker at the container.
async fn start_rabbitmq() -> (testcontainers::ContainerAsync<GenericImage>, Config) {
    let image = GenericImage::new("rabbitmq", "3-management")
        .with_exposed_port(5672.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Server startup complete"));

    let container = image
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start rabbitmq container");

    // Brief delay to ensure RabbitMQ is fully ready
    tokio::time::sleep(Duration::from_secs(2)).await;

    let port = container
        .get_host_port_ipv4(5672)
        .await
        .expect("Failed to get mapped port");
    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let mut config = Config::for_test();
    config.amqp.host = host.to_string();
    config.amqp.port = port;

    println!("RabbitMQ available at: {}", config.amqp.redacted_url());

    (container, config)
}

/// Publisher connection with the fan-out exchange declared.
async fn publisher(config: &Config) -> (Connection, lapin::Channel) {
    let conn = Connection::connect(&config.amqp.url(), ConnectionProperties::default())
        .await
        .expect("Failed to connect publisher");
    let channel = conn.create_channel().await.expect("Failed to open channel");
    channel
        .exchange_declare(
            DEFAULT_EXCHANGE,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions::default(),
            FieldTable::default(),
        )
        .await
        .expect("Failed to declare exchange");
    (conn, channel)
}

async fn publish(channel: &lapin::Channel, routing_key: &str, body: &str) {
    channel
        .basic_publish(
            DEFAULT_EXCHANGE,
            routing_key,
            BasicPublishOptions::default(),
            body.as_bytes(),
            BasicProperties::default(),
        )
        .await
        .expect("Failed to publish")
        .await
        .expect("Publish not confirmed");
}

async fn wait_for(mock: &MockCollaborators, call: Call) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !mock.calls().contains(&call) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Timed out waiting for registry call");
}

#[tokio::test]
async fn test_worker_syncs_published_events() {
    println!("=== Worker Sync Test ===");
    println!("Starting RabbitMQ container...");

    let (_container, config) = start_rabbitmq().await;
    let (_conn, channel) = publisher(&config).await;

    let mock = Arc::new(MockCollaborators::new());
    let sync = Arc::new(RegistrySync::new(mock.clone(), mock.clone(), mock.clone()));
    let worker = Arc::new(Worker::new(
        &config,
        Arc::new(AmqpBroker::new(&config.amqp)),
        sync,
    ));
    let mut lifecycle = worker.lifecycle();

    let shutdown = CancellationToken::new();
    let run = tokio::spawn({
        let worker = worker.clone();
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    let LifecycleEvent::Ready { queue, .. } =
        tokio::time::timeout(Duration::from_secs(10), lifecycle.recv())
            .await
            .expect("Timed out waiting for worker")
            .expect("Lifecycle closed");
    assert_eq!(queue, worker.queue());

    publish(
        &channel,
        EVENT_KEY,
        r#"{"type":"composr:Phrase","resourceId":"acme!42","action":"CREATE"}"#,
    )
    .await;
    wait_for(
        &mock,
        Call::Add {
            kind: ResourceKind::Phrase,
            id: "acme!42".to_string(),
        },
    )
    .await;

    // Filtered by routing key, then a malformed body, then a delete.
    publish(
        &channel,
        "other.event",
        r#"{"type":"composr:Snippet","resourceId":"acme!1","action":"DELETE"}"#,
    )
    .await;
    publish(&channel, EVENT_KEY, "{broken").await;
    publish(
        &channel,
        EVENT_KEY,
        r#"{"type":"composr:Snippet","resourceId":"acme!7","action":"DELETE"}"#,
    )
    .await;
    wait_for(
        &mock,
        Call::Remove {
            kind: ResourceKind::Snippet,
            id: "acme!7".to_string(),
        },
    )
    .await;
    assert!(!mock.calls().contains(&Call::Remove {
        kind: ResourceKind::Snippet,
        id: "acme!1".to_string(),
    }));

    shutdown.cancel();
    run.await.unwrap().expect("Worker should stop cleanly");
    assert_eq!(worker.state(), ConnectionState::Disconnected);

    println!("=== Worker Sync Test PASSED ===");
}

#[tokio::test]
async fn test_missing_exchange_is_fatal() {
    println!("=== Worker Missing Exchange Test ===");
    println!("Starting RabbitMQ container...");

    let (_container, mut config) = start_rabbitmq().await;
    config.amqp.exchange = format!("missing-{}", uuid::Uuid::new_v4());

    let mock = Arc::new(MockCollaborators::new());
    let sync = Arc::new(RegistrySync::new(mock.clone(), mock.clone(), mock.clone()));
    let worker = Worker::new(&config, Arc::new(AmqpBroker::new(&config.amqp)), sync);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        worker.run(CancellationToken::new()),
    )
    .await
    .expect("Worker should fail fast");

    assert!(matches!(
        result,
        Err(eventsync::WorkerError::Subscription(_))
    ));

    println!("=== Worker Missing Exchange Test PASSED ===");
}
