//! # EventBuss Testing
//!
//! Test doubles for the EventBuss gateway.
//!
//! The centerpiece is [`InMemoryBroker`], an implementation of the core
//! [`Broker`] and [`Connection`] traits that keeps everything in memory and
//! makes the interesting failure modes scriptable:
//!
//! - force the next N connect attempts to fail (retry and breaker tests)
//! - choose how emissions are answered: confirm, reject, or never answer
//!   (the three arms of the publish race)
//! - inject inbound deliveries and close subscriptions (consumer loop tests)
//! - observe captured messages, acknowledgment order, and open connections
//!
//! ## Example
//!
//! ```
//! use eventbuss_testing::{AckMode, InMemoryBroker};
//!
//! let broker = InMemoryBroker::new();
//! broker.set_ack_mode(AckMode::Reject("queue full".into()));
//! broker.fail_connects(2); // next two connects fail, third succeeds
//! ```

use eventbuss_core::broker::{
    AckFuture, Acker, Broker, BrokerError, Connection, Delivery, DeliveryStream, EmitAck,
};
use eventbuss_core::{Message, Route};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// How the in-memory broker answers each emission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Confirm immediately.
    #[default]
    Confirm,
    /// Reject immediately with the given reason.
    Reject(String),
    /// Never answer; the publisher's deadline decides.
    Never,
}

type DeliverySender = mpsc::Sender<Result<Delivery, BrokerError>>;

#[derive(Default)]
struct Shared {
    connect_attempts: AtomicUsize,
    forced_connect_failures: AtomicUsize,
    open_connections: AtomicUsize,
    fail_next_subscribe: AtomicUsize,
    ack_mode: Mutex<AckMode>,
    published: Mutex<Vec<Message>>,
    acked: Mutex<Vec<Vec<u8>>>,
    // Keyed by exchange name: each default event binds a distinct exchange.
    subscriptions: Mutex<HashMap<String, DeliverySender>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`Broker`] with scriptable behavior.
///
/// Cheap to clone; clones share state, so a test can hold the broker while
/// the gateway holds another handle to the same instance.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Create a broker that accepts connections and confirms emissions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next `n` connect attempts to fail.
    ///
    /// Replaces any previously scripted count; `usize::MAX` means "keep
    /// failing".
    pub fn fail_connects(&self, n: usize) {
        self.shared.forced_connect_failures.store(n, Ordering::SeqCst);
    }

    /// Force the next subscribe call to fail.
    pub fn fail_next_subscribe(&self) {
        self.shared.fail_next_subscribe.store(1, Ordering::SeqCst);
    }

    /// Script how subsequent emissions are answered.
    pub fn set_ack_mode(&self, mode: AckMode) {
        *lock(&self.shared.ack_mode) = mode;
    }

    /// Total connect attempts observed, including forced failures.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Connections currently open (connected and not yet closed).
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.shared.open_connections.load(Ordering::SeqCst)
    }

    /// Every message submitted for emission, in order.
    #[must_use]
    pub fn published(&self) -> Vec<Message> {
        lock(&self.shared.published).clone()
    }

    /// Payloads acknowledged by consumers, in acknowledgment order.
    #[must_use]
    pub fn acked(&self) -> Vec<Vec<u8>> {
        lock(&self.shared.acked).clone()
    }

    /// Deliver `payload` to the subscription bound to `exchange`.
    ///
    /// Returns `false` if nothing is subscribed there.
    pub async fn inject(&self, exchange: &str, payload: Vec<u8>) -> bool {
        let sender = lock(&self.shared.subscriptions).get(exchange).cloned();
        match sender {
            Some(tx) => {
                let acker = RecordingAcker {
                    payload: payload.clone(),
                    shared: Arc::clone(&self.shared),
                };
                tx.send(Ok(Delivery::new(payload, Box::new(acker))))
                    .await
                    .is_ok()
            }
            None => false,
        }
    }

    /// Deliver a transport error to the subscription bound to `exchange`.
    pub async fn inject_error(&self, exchange: &str, error: BrokerError) -> bool {
        let sender = lock(&self.shared.subscriptions).get(exchange).cloned();
        match sender {
            Some(tx) => tx.send(Err(error)).await.is_ok(),
            None => false,
        }
    }

    /// Close the subscription bound to `exchange`; its stream ends.
    pub fn close_subscription(&self, exchange: &str) {
        lock(&self.shared.subscriptions).remove(exchange);
    }

    /// Whether a subscription is live for `exchange`.
    #[must_use]
    pub fn has_subscription(&self, exchange: &str) -> bool {
        lock(&self.shared.subscriptions).contains_key(exchange)
    }
}

impl Broker for InMemoryBroker {
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);

            let remaining = self.shared.forced_connect_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                if remaining != usize::MAX {
                    self.shared
                        .forced_connect_failures
                        .store(remaining - 1, Ordering::SeqCst);
                }
                return Err(BrokerError::ConnectionFailed(
                    "scripted connect failure".into(),
                ));
            }

            self.shared.open_connections.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(InMemoryConnection {
                shared: Arc::clone(&self.shared),
            }) as Box<dyn Connection>)
        })
    }
}

struct InMemoryConnection {
    shared: Arc<Shared>,
}

impl Connection for InMemoryConnection {
    fn emit(
        &self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = Result<AckFuture, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let mode = lock(&self.shared.ack_mode).clone();
            lock(&self.shared.published).push(message);

            let ack: AckFuture = match mode {
                AckMode::Confirm => Box::pin(std::future::ready(EmitAck::Confirmed)),
                AckMode::Reject(reason) => {
                    Box::pin(std::future::ready(EmitAck::Rejected(reason)))
                }
                AckMode::Never => Box::pin(std::future::pending()),
            };
            Ok(ack)
        })
    }

    fn subscribe(
        &self,
        route: &Route,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>> {
        let route = route.clone();
        Box::pin(async move {
            if self
                .shared
                .fail_next_subscribe
                .swap(0, Ordering::SeqCst)
                > 0
            {
                return Err(BrokerError::SubscribeFailed {
                    queue: route.queue,
                    reason: "scripted subscribe failure".into(),
                });
            }

            let (tx, mut rx) = mpsc::channel(64);
            lock(&self.shared.subscriptions).insert(route.exchange.clone(), tx);

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(Box::pin(stream) as DeliveryStream)
        })
    }

    fn run(&self) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        // Nothing to maintain; park until the supervisor aborts us.
        Box::pin(std::future::pending())
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let open = &self.shared.open_connections;
            let _ = open.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            Ok(())
        })
    }
}

struct RecordingAcker {
    payload: Vec<u8>,
    shared: Arc<Shared>,
}

impl Acker for RecordingAcker {
    fn ack(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send>> {
        lock(&self.shared.acked).push(self.payload);
        Box::pin(std::future::ready(Ok(())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use eventbuss_core::{DeliveryMode, ExchangeKind};
    use futures::StreamExt;

    fn route() -> Route {
        Route {
            exchange: "test_exch".into(),
            key: "test_key".into(),
            queue: "test-queue".into(),
            kind: ExchangeKind::Direct,
        }
    }

    #[tokio::test]
    async fn scripted_connect_failures_then_success() {
        let broker = InMemoryBroker::new();
        broker.fail_connects(2);

        assert!(broker.connect().await.is_err());
        assert!(broker.connect().await.is_err());
        assert!(broker.connect().await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
        assert_eq!(broker.open_connections(), 1);
    }

    #[tokio::test]
    async fn emit_captures_the_message_and_honors_ack_mode() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect().await.unwrap();

        let ack = conn
            .emit(Message::persistent(route(), vec![1, 2]))
            .await
            .unwrap();
        assert_eq!(ack.await, EmitAck::Confirmed);

        broker.set_ack_mode(AckMode::Reject("no".into()));
        let ack = conn
            .emit(Message::persistent(route(), vec![3]))
            .await
            .unwrap();
        assert_eq!(ack.await, EmitAck::Rejected("no".into()));

        let published = broker.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].payload, vec![1, 2]);
        assert_eq!(published[0].delivery_mode, DeliveryMode::Persistent);
    }

    #[tokio::test]
    async fn injected_deliveries_flow_and_acks_are_recorded() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect().await.unwrap();
        let mut stream = conn.subscribe(&route()).await.unwrap();

        assert!(broker.inject("test_exch", vec![9, 9]).await);
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), &[9, 9]);
        delivery.ack().await.unwrap();
        assert_eq!(broker.acked(), vec![vec![9, 9]]);

        broker.close_subscription("test_exch");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn inject_without_subscription_reports_false() {
        let broker = InMemoryBroker::new();
        assert!(!broker.inject("nowhere", vec![1]).await);
    }

    #[tokio::test]
    async fn scripted_subscribe_failure_is_one_shot() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect().await.unwrap();

        broker.fail_next_subscribe();
        assert!(conn.subscribe(&route()).await.is_err());
        assert!(conn.subscribe(&route()).await.is_ok());
    }
}
