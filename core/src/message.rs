//! Outbound messages and publish outcomes.

use crate::route::Route;
use std::fmt;

/// Whether a message survives a broker restart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Kept in memory only.
    Transient,
    /// Written to disk by the broker.
    #[default]
    Persistent,
}

/// A message addressed and ready for emission.
///
/// Built fresh for every publish call and immutable once built: the route is
/// resolved and the payload encoded before the message exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Broker address the message is emitted to.
    pub route: Route,
    /// Encoded payload bytes.
    pub payload: Vec<u8>,
    /// Broker persistence for this message.
    pub delivery_mode: DeliveryMode,
}

impl Message {
    /// Create a message with an explicit delivery mode.
    #[must_use]
    pub const fn new(route: Route, payload: Vec<u8>, delivery_mode: DeliveryMode) -> Self {
        Self {
            route,
            payload,
            delivery_mode,
        }
    }

    /// Create a persistent message, the gateway default.
    #[must_use]
    pub const fn persistent(route: Route, payload: Vec<u8>) -> Self {
        Self::new(route, payload, DeliveryMode::Persistent)
    }
}

/// Terminal outcome of a publish call.
///
/// Exactly one outcome is produced per call: the first of broker confirm,
/// broker reject, or deadline expiry wins and the others are discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker accepted the message.
    Confirmed,
    /// The broker refused the message, with its stated reason.
    Rejected(String),
    /// No confirm or reject arrived within the deadline.
    TimedOut,
}

impl PublishOutcome {
    /// Whether the broker accepted the message.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => f.write_str("confirmed"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}
