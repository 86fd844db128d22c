//! Application-level event identifiers.
//!
//! An [`Event`] names a kind of occurrence that can be published or consumed
//! through the gateway. It is deliberately an open set: the type accepts any
//! identifier, and an identifier without a registered route is a runtime
//! condition surfaced by the route table, not a type error.
//!
//! # Example
//!
//! ```
//! use eventbuss_core::Event;
//!
//! let event = Event::USER_REGISTRATION;
//! assert_eq!(event.id(), 1);
//! assert_eq!(event.to_string(), "user-registration");
//!
//! // Any identifier is representable; routing decides deliverability.
//! let custom = Event::new(42);
//! assert_eq!(custom.to_string(), "event#42");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a kind of application event.
///
/// Events are small, stable, integer-like identifiers. Two kinds ship with
/// the gateway and have default routes bound by
/// [`RouteTable::register`](crate::RouteTable::register); applications extend
/// the set by inserting routes for their own identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(u32);

impl Event {
    /// A user completed registration.
    pub const USER_REGISTRATION: Self = Self(1);

    /// A user was authorized.
    pub const USER_AUTHORIZATION: Self = Self(2);

    /// Create an event identifier from a raw id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::USER_REGISTRATION => f.write_str("user-registration"),
            Self::USER_AUTHORIZATION => f.write_str("user-authorization"),
            Self(id) => write!(f, "event#{id}"),
        }
    }
}

impl From<u32> for Event {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
