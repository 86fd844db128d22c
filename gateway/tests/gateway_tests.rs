//! End-to-end gateway tests against the in-memory broker.

#![allow(clippy::unwrap_used, clippy::panic)]

use eventbuss_core::route::{EXCHANGE_USER_AUTHORIZATION, EXCHANGE_USER_REGISTER};
use eventbuss_core::{
    Broker, ConnectionState, DeliveryMode, Event, PublishOutcome, Route,
};
use eventbuss_gateway::multi::handler;
use eventbuss_gateway::{
    EventBuss, FanoutMode, FanoutOutcome, ListenError, ListenOutcome, PublishError,
};
use eventbuss_runtime::ConnectorConfig;
use eventbuss_testing::{AckMode, InMemoryBroker};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Registration {
    user_id: u64,
    email: String,
}

fn registration() -> Registration {
    Registration {
        user_id: 42,
        email: "user@example.com".into(),
    }
}

fn fast_connector() -> ConnectorConfig {
    ConnectorConfig {
        attempts: 1,
        sleep: Duration::ZERO,
        ..ConnectorConfig::default()
    }
}

fn bus_over(broker: &InMemoryBroker) -> EventBuss {
    EventBuss::builder()
        .service_name("orders-svc")
        .connector(fast_connector())
        .build(Arc::new(broker.clone()))
        .unwrap()
}

// Surface gateway logs in test output; first caller wins, the rest no-op.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Spin until `predicate` holds; panics if it never does.
async fn wait_until(predicate: impl Fn() -> bool) {
    for _ in 0..1000 {
        if predicate() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn push_confirmed_captures_route_and_payload() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);

    let outcome = bus
        .push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap();
    assert_eq!(outcome, PublishOutcome::Confirmed);

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].route.exchange, EXCHANGE_USER_REGISTER);
    assert_eq!(published[0].route.key, "event_buss_key_user_register");
    assert_eq!(published[0].route.queue, "orders-svc");
    assert_eq!(published[0].delivery_mode, DeliveryMode::Persistent);

    let decoded: Registration = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(decoded, registration());

    // The publish connection is torn down on the success path.
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn push_rejection_carries_the_broker_reason() {
    let broker = InMemoryBroker::new();
    broker.set_ack_mode(AckMode::Reject("exchange missing".into()));
    let bus = bus_over(&broker);

    let outcome = bus
        .push(Event::USER_AUTHORIZATION, &registration())
        .await
        .unwrap();
    assert_eq!(outcome, PublishOutcome::Rejected("exchange missing".into()));
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn push_times_out_at_the_configured_deadline() {
    init_tracing();
    let broker = InMemoryBroker::new();
    broker.set_ack_mode(AckMode::Never);
    let bus = EventBuss::builder()
        .service_name("orders-svc")
        .connector(fast_connector())
        .publish_deadline(Duration::from_millis(500))
        .build(Arc::new(broker.clone()))
        .unwrap();

    let start = tokio::time::Instant::now();
    let outcome = bus
        .push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap();

    assert_eq!(outcome, PublishOutcome::TimedOut);
    assert_eq!(start.elapsed(), Duration::from_millis(500));
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn push_of_an_unknown_event_fails_before_connecting() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);

    let err = bus.push(Event::new(99), &registration()).await.unwrap_err();
    assert!(matches!(err, PublishError::Route(_)));
    assert_eq!(broker.connect_attempts(), 0);
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn unencodable_payload_fails_before_connecting() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);

    // JSON requires string map keys.
    let payload: HashMap<Vec<u8>, u8> = HashMap::from([(vec![1], 1)]);
    let err = bus
        .push(Event::USER_REGISTRATION, &payload)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Codec(_)));
    assert_eq!(broker.connect_attempts(), 0);
}

#[tokio::test]
async fn open_circuit_rejects_pushes_without_touching_the_broker() {
    init_tracing();
    let broker = InMemoryBroker::new();
    broker.fail_connects(usize::MAX);
    let bus = EventBuss::builder()
        .service_name("orders-svc")
        .connector(ConnectorConfig {
            attempts: 1,
            sleep: Duration::ZERO,
            threshold: 1,
            cool_down: Duration::from_secs(60),
        })
        .build(Arc::new(broker.clone()))
        .unwrap();

    let first = bus
        .push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap_err();
    assert!(matches!(
        first,
        PublishError::Connect(eventbuss_runtime::ConnectError::Broker(_))
    ));
    assert_eq!(broker.connect_attempts(), 1);

    let second = bus
        .push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap_err();
    assert!(matches!(
        second,
        PublishError::Connect(eventbuss_runtime::ConnectError::CircuitOpen)
    ));
    assert_eq!(broker.connect_attempts(), 1);
}

#[tokio::test]
async fn listener_acks_before_the_handler_runs() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);

    // Record how many acks the broker had seen when each handler ran.
    let acked_at_dispatch = Arc::new(Mutex::new(Vec::new()));

    let listener = {
        let bus = bus.clone();
        let broker = broker.clone();
        let seen = Arc::clone(&acked_at_dispatch);
        tokio::spawn(async move {
            bus.listen(Event::USER_REGISTRATION, move |_payload: Vec<u8>| {
                let broker = broker.clone();
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(broker.acked().len());
                    Ok::<(), Infallible>(())
                }
            })
            .await
        })
    };

    wait_until(|| broker.has_subscription(EXCHANGE_USER_REGISTER)).await;
    assert!(broker.inject(EXCHANGE_USER_REGISTER, vec![1]).await);
    wait_until(|| !acked_at_dispatch.lock().unwrap().is_empty()).await;

    // The delivery was already acknowledged when the handler observed it.
    assert_eq!(*acked_at_dispatch.lock().unwrap(), vec![1]);

    broker.close_subscription(EXCHANGE_USER_REGISTER);
    let outcome = listener.await.unwrap().unwrap();
    assert_eq!(outcome, ListenOutcome::Stopped);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn handler_failure_does_not_stop_the_loop_or_requeue() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);
    let handled = Arc::new(AtomicUsize::new(0));

    let listener = {
        let bus = bus.clone();
        let handled = Arc::clone(&handled);
        tokio::spawn(async move {
            bus.listen(Event::USER_REGISTRATION, move |payload: Vec<u8>| {
                let handled = Arc::clone(&handled);
                async move {
                    handled.fetch_add(1, Ordering::SeqCst);
                    if payload == [1] {
                        Err("first message is poison".to_string())
                    } else {
                        Ok(())
                    }
                }
            })
            .await
        })
    };

    wait_until(|| broker.has_subscription(EXCHANGE_USER_REGISTER)).await;
    assert!(broker.inject(EXCHANGE_USER_REGISTER, vec![1]).await);
    assert!(broker.inject(EXCHANGE_USER_REGISTER, vec![2]).await);
    wait_until(|| handled.load(Ordering::SeqCst) == 2).await;

    // Both messages were acknowledged despite the first handler failing.
    assert_eq!(broker.acked(), vec![vec![1], vec![2]]);

    broker.close_subscription(EXCHANGE_USER_REGISTER);
    assert_eq!(listener.await.unwrap().unwrap(), ListenOutcome::Stopped);
}

#[tokio::test]
async fn listen_for_an_unknown_event_is_an_explicit_error() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);

    let err = bus
        .listen(Event::new(7), |_: Vec<u8>| async {
            Ok::<(), Infallible>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ListenError::Route(_)));
    assert_eq!(broker.connect_attempts(), 0);
}

#[tokio::test]
async fn failed_subscription_tears_down_its_connection() {
    let broker = InMemoryBroker::new();
    broker.fail_next_subscribe();
    let bus = bus_over(&broker);

    let err = bus
        .listen(Event::USER_REGISTRATION, |_: Vec<u8>| async {
            Ok::<(), Infallible>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ListenError::Subscribe(_)));
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn detached_fanout_runs_every_consumer_concurrently() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);
    let registrations = Arc::new(AtomicUsize::new(0));
    let authorizations = Arc::new(AtomicUsize::new(0));

    let pairs = vec![
        (Event::USER_REGISTRATION, {
            let n = Arc::clone(&registrations);
            handler(move |_payload| {
                let n = Arc::clone(&n);
                async move {
                    n.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), Infallible>(())
                }
            })
        }),
        (Event::USER_AUTHORIZATION, {
            let n = Arc::clone(&authorizations);
            handler(move |_payload| {
                let n = Arc::clone(&n);
                async move {
                    n.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), Infallible>(())
                }
            })
        }),
    ];

    let FanoutOutcome::Detached(set) = bus.listen_all(pairs, FanoutMode::Detached).await else {
        panic!("detached mode must return the listener set");
    };
    assert_eq!(set.len(), 2);

    wait_until(|| {
        broker.has_subscription(EXCHANGE_USER_REGISTER)
            && broker.has_subscription(EXCHANGE_USER_AUTHORIZATION)
    })
    .await;

    // Both subscriptions are live at once, regardless of pair order.
    assert!(broker.inject(EXCHANGE_USER_AUTHORIZATION, vec![2]).await);
    assert!(broker.inject(EXCHANGE_USER_REGISTER, vec![1]).await);
    wait_until(|| {
        registrations.load(Ordering::SeqCst) == 1 && authorizations.load(Ordering::SeqCst) == 1
    })
    .await;

    set.abort_all();
}

#[tokio::test]
async fn awaited_fanout_collects_every_outcome() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);

    let pairs = vec![
        (
            Event::USER_REGISTRATION,
            handler(|_payload| async { Ok::<(), Infallible>(()) }),
        ),
        (
            Event::USER_AUTHORIZATION,
            handler(|_payload| async { Ok::<(), Infallible>(()) }),
        ),
    ];

    let fanout = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.listen_all(pairs, FanoutMode::Await).await })
    };

    wait_until(|| {
        broker.has_subscription(EXCHANGE_USER_REGISTER)
            && broker.has_subscription(EXCHANGE_USER_AUTHORIZATION)
    })
    .await;
    broker.close_subscription(EXCHANGE_USER_REGISTER);
    broker.close_subscription(EXCHANGE_USER_AUTHORIZATION);

    let FanoutOutcome::Completed(outcomes) = fanout.await.unwrap() else {
        panic!("await mode must block for the outcomes");
    };
    assert_eq!(outcomes.len(), 2);
    for (_event, result) in outcomes {
        assert_eq!(result.unwrap(), ListenOutcome::Stopped);
    }
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn reregistered_routes_apply_to_subsequent_pushes() {
    let broker = InMemoryBroker::new();
    let bus = bus_over(&broker);

    bus.push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap();
    bus.register_routes("billing-svc").await;
    bus.push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap();

    let published = broker.published();
    assert_eq!(published[0].route.queue, "orders-svc");
    assert_eq!(published[1].route.queue, "billing-svc");
}

#[tokio::test]
async fn route_overrides_beat_the_defaults() {
    let broker = InMemoryBroker::new();
    let bus = EventBuss::builder()
        .service_name("orders-svc")
        .connector(fast_connector())
        .route_override(
            Event::USER_REGISTRATION,
            Route::direct("custom_exch", "custom_key", "custom-queue"),
        )
        .build(Arc::new(broker.clone()))
        .unwrap();

    bus.push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap();
    assert_eq!(broker.published()[0].route.exchange, "custom_exch");
}

#[tokio::test]
async fn state_changes_are_reported_around_each_push() {
    let broker = InMemoryBroker::new();
    let seen: Arc<Mutex<Vec<(ConnectionState, ConnectionState)>>> = Arc::default();
    let sink = Arc::clone(&seen);

    let bus = EventBuss::builder()
        .service_name("orders-svc")
        .connector(fast_connector())
        .on_state_change(Arc::new(move |_name, from, to| {
            sink.lock().unwrap().push((from, to));
        }))
        .build(Arc::new(broker.clone()))
        .unwrap();

    bus.push(Event::USER_REGISTRATION, &registration())
        .await
        .unwrap();

    use ConnectionState::{Closed, Connecting, Open};
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(Closed, Connecting), (Connecting, Open), (Open, Closed)]
    );
}

#[tokio::test]
async fn builder_rejects_invalid_configuration() {
    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());

    assert!(
        EventBuss::builder()
            .service_name("")
            .build(Arc::clone(&broker))
            .is_err()
    );
    assert!(
        EventBuss::builder()
            .connector(ConnectorConfig {
                attempts: 0,
                ..ConnectorConfig::default()
            })
            .build(Arc::clone(&broker))
            .is_err()
    );
    assert!(
        EventBuss::builder()
            .publish_deadline(Duration::ZERO)
            .build(broker)
            .is_err()
    );
}
