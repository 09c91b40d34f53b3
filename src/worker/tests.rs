use std::time::Duration;

use super::memory::{Binding, DeclaredQueue, InMemoryBroker};
use super::*;
use crate::error::WorkerError;
use crate::events::ResourceKind;
use crate::registry::mock::{Call, MockCollaborators};
use tokio::task::JoinHandle;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    worker: Arc<Worker>,
    broker: InMemoryBroker,
    mock: Arc<MockCollaborators>,
    lifecycle: broadcast::Receiver<LifecycleEvent>,
    shutdown: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        let broker = InMemoryBroker::new();
        let mock = Arc::new(MockCollaborators::new());
        let sync = Arc::new(RegistrySync::new(mock.clone(), mock.clone(), mock.clone()));
        let worker = Arc::new(Worker::new(
            &Config::for_test(),
            Arc::new(broker.clone()),
            sync,
        ));
        let lifecycle = worker.lifecycle();

        Self {
            worker,
            broker,
            mock,
            lifecycle,
            shutdown: CancellationToken::new(),
        }
    }

    fn start(&self) -> JoinHandle<Result<()>> {
        let worker = self.worker.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    }

    async fn ready(&mut self) -> LifecycleEvent {
        tokio::time::timeout(WAIT, self.lifecycle.recv())
            .await
            .expect("timed out waiting for ready")
            .expect("lifecycle channel closed")
    }

    async fn wait_for_calls(&self, pred: impl Fn(&Call) -> bool, expected: usize) {
        tokio::time::timeout(WAIT, async {
            while self.mock.count(&pred) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for registry calls");
    }
}

fn event_body(kind: &str, id: &str, action: &str) -> String {
    format!(
        r#"{{"type":"{}","resourceId":"{}","action":"{}"}}"#,
        kind, id, action
    )
}

#[test]
fn test_identity_names_queue() {
    let harness = Harness::new();
    let worker = &harness.worker;

    assert_eq!(
        worker.queue(),
        format!("eventsync-{}", worker.identity())
    );
    assert_eq!(worker.identity(), worker.identity());
    assert_eq!(worker.state(), ConnectionState::Disconnected);
}

#[test]
fn test_identities_are_unique() {
    assert_ne!(WorkerIdentity::generate(), WorkerIdentity::generate());
}

#[test]
fn test_subscription_for_worker() {
    let identity = WorkerIdentity::generate();
    let sub = Subscription::for_worker("srv-", identity, "eventbus.exchange");

    assert_eq!(sub.queue, format!("srv-{}", identity));
    assert_eq!(sub.pattern, "");
    assert!(!sub.durable);
    assert!(sub.auto_delete);
}

#[tokio::test]
async fn test_ready_after_subscription() {
    let mut harness = Harness::new();
    let run = harness.start();

    let LifecycleEvent::Ready { worker_id, queue } = harness.ready().await;
    assert_eq!(worker_id, harness.worker.identity());
    assert_eq!(queue, harness.worker.queue());
    assert_eq!(harness.worker.state(), ConnectionState::Connected);

    assert_eq!(
        harness.broker.declared(),
        vec![DeclaredQueue {
            name: queue.clone(),
            durable: false,
            auto_delete: true,
        }]
    );
    assert_eq!(
        harness.broker.bindings(),
        vec![Binding {
            queue,
            exchange: "eventbus.exchange".to_string(),
            pattern: String::new(),
        }]
    );

    harness.shutdown.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connect_failure_retries_until_success() {
    let mut harness = Harness::new();
    harness.broker.fail_next_connects(2);
    let run = harness.start();

    harness.ready().await;
    assert_eq!(harness.broker.connects(), 3);
    assert_eq!(harness.broker.declared().len(), 1);

    harness.shutdown.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_subscription_failure_is_fatal() {
    let harness = Harness::new();
    harness.broker.fail_binds(true);

    let result = harness.start().await.unwrap();

    assert!(matches!(result, Err(WorkerError::Subscription(_))));
    assert_eq!(harness.broker.closes(), 1);
    assert_eq!(harness.broker.connects(), 1);
    assert_eq!(harness.worker.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_broker_error_restarts_full_init() {
    let mut harness = Harness::new();
    let run = harness.start();
    harness.ready().await;

    harness.broker.drop_connection();
    harness.ready().await;

    assert_eq!(harness.broker.connects(), 2);
    let declared = harness.broker.declared();
    assert_eq!(declared.len(), 2);
    assert_eq!(declared[0], declared[1]);
    assert_eq!(harness.broker.bindings().len(), 2);
    assert_eq!(harness.broker.closes(), 1);

    // The new session consumes.
    assert!(harness.broker.publish(
        "eventbus.event",
        event_body("composr:Snippet", "acme!7", "DELETE"),
    ));
    harness
        .wait_for_calls(|c| matches!(c, Call::Remove { .. }), 1)
        .await;

    harness.shutdown.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_state_transitions_in_order() {
    let mut harness = Harness::new();
    let mut transitions = harness.worker.transitions();
    harness.broker.fail_next_connects(1);
    let run = harness.start();

    harness.ready().await;
    harness.broker.drop_connection();
    harness.ready().await;
    harness.shutdown.cancel();
    assert_ok!(run.await.unwrap());

    let mut states = Vec::new();
    while let Ok(state) = transitions.try_recv() {
        states.push(state);
    }

    use ConnectionState::*;
    assert_eq!(
        states,
        vec![
            Connecting,
            Disconnected,
            Connecting,
            Connected,
            Disconnected,
            Connecting,
            Connected,
            Closing,
            Disconnected,
        ]
    );
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let mut harness = Harness::new();
    let mut state = harness.worker.watch_state();
    let run = harness.start();
    harness.ready().await;

    harness.shutdown.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(harness.broker.closes(), 1);
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_shutdown_while_retrying() {
    let harness = Harness::new();
    harness.broker.fail_next_connects(usize::MAX);
    let run = harness.start();

    tokio::time::sleep(Duration::from_millis(30)).await;
    harness.shutdown.cancel();

    tokio::time::timeout(WAIT, run)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(harness.broker.closes(), 0);
    assert_eq!(harness.worker.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_deliveries_reach_registry() {
    let mut harness = Harness::new();
    let run = harness.start();
    harness.ready().await;

    harness.broker.publish(
        "eventbus.event",
        event_body("composr:Phrase", "acme!42", "CREATE"),
    );
    harness
        .wait_for_calls(|c| matches!(c, Call::Add { .. }), 1)
        .await;

    assert!(harness.mock.calls().contains(&Call::Add {
        kind: ResourceKind::Phrase,
        id: "acme!42".to_string(),
    }));

    harness.shutdown.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_delivery_does_not_stop_consumer() {
    let mut harness = Harness::new();
    let run = harness.start();
    harness.ready().await;

    harness.broker.publish("eventbus.event", "{broken");
    harness.broker.publish(
        "other.event",
        event_body("composr:Phrase", "acme!1", "DELETE"),
    );
    harness.broker.publish(
        "eventbus.event",
        event_body("composr:Snippet", "acme!7", "DELETE"),
    );
    harness
        .wait_for_calls(|c| matches!(c, Call::Unregister { .. }), 1)
        .await;

    assert_eq!(harness.worker.state(), ConnectionState::Connected);
    assert!(!harness.mock.calls().contains(&Call::Remove {
        kind: ResourceKind::Phrase,
        id: "acme!1".to_string(),
    }));

    harness.shutdown.cancel();
    run.await.unwrap().unwrap();
}
