//! Error taxonomy of the gateway surface.
//!
//! Every failure a caller can act on is returned, not just logged: publish
//! fails closed before touching the broker when the route or payload is bad,
//! and listen reports why it could not start. The one deliberate exception
//! is the consumer dispatch loop, which logs handler errors and keeps going
//! (at-most-once delivery, see [`crate::consume`]).

use eventbuss_core::{BrokerError, CodecError, RouteError};
use eventbuss_runtime::ConnectError;
use thiserror::Error;

/// Errors from gateway construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The service name is empty; it is used as the binding queue name.
    #[error("service name must not be empty")]
    EmptyServiceName,

    /// Connect attempts must be at least one.
    #[error("connect attempts must be at least 1")]
    ZeroConnectAttempts,

    /// The publish deadline must be non-zero.
    #[error("publish deadline must be non-zero")]
    ZeroPublishDeadline,
}

/// Errors from a publish call.
///
/// These are the pre-emission failures; a message that reached the broker
/// always resolves to a [`PublishOutcome`](eventbuss_core::PublishOutcome)
/// instead.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event has no registered route.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The payload could not be encoded; nothing was emitted.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No connection could be established.
    #[error("broker connection failed: {0}")]
    Connect(#[from] ConnectError),

    /// The connection was up but the message could not be submitted.
    #[error("emission failed: {0}")]
    Emit(#[from] BrokerError),
}

/// Errors that abort a listen call before its dispatch loop starts.
#[derive(Error, Debug)]
pub enum ListenError {
    /// The event has no registered route; listening for other events is
    /// unaffected.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// No connection could be established.
    #[error("broker connection failed: {0}")]
    Connect(#[from] ConnectError),

    /// The subscription could not be opened.
    #[error("subscription failed: {0}")]
    Subscribe(#[source] BrokerError),
}
