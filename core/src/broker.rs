//! Narrow interfaces to the broker collaborator.
//!
//! The gateway never speaks the wire protocol itself. It consumes a broker
//! client through the traits here: [`Broker`] opens connections,
//! [`Connection`] emits messages and opens subscriptions, and inbound
//! messages arrive as [`Delivery`] values with a consuming acknowledgment.
//!
//! The traits return `Pin<Box<dyn Future>>` instead of `async fn` so that
//! `Arc<dyn Broker>` and `Box<dyn Connection>` trait objects work; the
//! gateway, supervisor, and test doubles all share them.

use crate::message::Message;
use crate::route::Route;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Observable lifecycle state of a supervised broker connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection.
    #[default]
    Closed,
    /// A connect attempt is in flight.
    Connecting,
    /// The connection is established.
    Open,
    /// The circuit breaker is rejecting connect attempts.
    CircuitOpen,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::CircuitOpen => f.write_str("circuit-open"),
        }
    }
}

/// Errors reported by the broker collaborator.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// Could not establish a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A message could not be submitted for emission.
    #[error("emit failed on exchange '{exchange}': {reason}")]
    EmitFailed {
        /// Exchange the emission targeted.
        exchange: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// A subscription could not be opened.
    #[error("subscription failed for queue '{queue}': {reason}")]
    SubscribeFailed {
        /// Queue the subscription targeted.
        queue: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// An acknowledgment was not accepted.
    #[error("acknowledgment failed: {0}")]
    AckFailed(String),

    /// The transport failed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// Broker verdict on an emitted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmitAck {
    /// The broker accepted the message.
    Confirmed,
    /// The broker refused the message.
    Rejected(String),
}

/// Pending broker verdict for one emission.
///
/// Resolves once the broker confirms or rejects; may stay pending forever if
/// the broker never answers, which is why publishers race it against a
/// deadline.
pub type AckFuture = Pin<Box<dyn Future<Output = EmitAck> + Send>>;

/// One-shot acknowledgment capability carried by a [`Delivery`].
pub trait Acker: Send {
    /// Acknowledge the delivery without requeueing it.
    fn ack(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send>>;
}

/// An inbound message handed to a consumer.
pub struct Delivery {
    payload: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    /// Assemble a delivery from its payload and acknowledgment capability.
    #[must_use]
    pub fn new(payload: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self { payload, acker }
    }

    /// The raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Acknowledge the delivery, consuming it.
    ///
    /// Consuming `self` makes double-acknowledgment unrepresentable.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AckFailed`] if the broker did not accept the
    /// acknowledgment.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// Live channel of inbound messages bound to one route.
///
/// The stream ends when the subscription is closed, either by the broker or
/// by connection teardown.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

/// An established broker connection.
pub trait Connection: Send + Sync {
    /// Submit a message for asynchronous emission.
    ///
    /// Returns an [`AckFuture`] resolving to the broker's verdict. The
    /// message is addressed entirely by its [`Route`]; the connection does
    /// not consult any registry.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::EmitFailed`] if the message could not be
    /// submitted at all (as opposed to submitted and rejected).
    fn emit(
        &self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = Result<AckFuture, BrokerError>> + Send + '_>>;

    /// Open a subscription for `route`, declaring broker-side topology as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::SubscribeFailed`] if the subscription could
    /// not be opened.
    fn subscribe(
        &self,
        route: &Route,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>>;

    /// Background maintenance loop for this connection.
    ///
    /// The supervisor spawns this as an independent task and aborts it on
    /// teardown; implementations that maintain themselves internally may
    /// return a future that parks forever.
    fn run(&self) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

    /// Release the connection and its broker resources.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if teardown did not complete cleanly; the
    /// connection must still be considered unusable afterwards.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

/// Factory for broker connections.
pub trait Broker: Send + Sync {
    /// Open a new connection.
    ///
    /// One network round trip per call; retry and circuit-breaking live in
    /// the supervisor, not here.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if the broker is
    /// unreachable or refuses the connection.
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, BrokerError>> + Send + '_>>;
}
