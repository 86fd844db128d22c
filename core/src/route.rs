//! Event-to-route resolution.
//!
//! A [`Route`] is the broker-level address an event is published to or
//! consumed from: an exchange, a routing key, a binding queue, and the
//! exchange kind. The [`RouteTable`] maps event identifiers to routes and is
//! owned by the gateway instance that uses it; there is no process-global
//! table, so multiple gateways in one process cannot observe each other's
//! registrations.
//!
//! # Resolution semantics
//!
//! - [`RouteTable::register`] (re)binds the built-in events to their default
//!   direct exchanges using the given queue name. Re-registration overwrites:
//!   last writer wins.
//! - [`RouteTable::resolve`] returns [`RouteError::Unregistered`] for an
//!   unknown event instead of a silently undeliverable empty route.

use crate::event::Event;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Default exchange for [`Event::USER_REGISTRATION`].
pub const EXCHANGE_USER_REGISTER: &str = "event_buss_exch_user_register";
/// Default routing key for [`Event::USER_REGISTRATION`].
pub const KEY_USER_REGISTER: &str = "event_buss_key_user_register";
/// Default exchange for [`Event::USER_AUTHORIZATION`].
pub const EXCHANGE_USER_AUTHORIZATION: &str = "event_buss_exch_user_authorization";
/// Default routing key for [`Event::USER_AUTHORIZATION`].
pub const KEY_USER_AUTHORIZATION: &str = "event_buss_key_user_authorization";

/// Kind of exchange a route binds through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Exact routing-key match.
    #[default]
    Direct,
    /// Pattern routing-key match.
    Topic,
    /// Broadcast to every bound queue.
    Fanout,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Topic => f.write_str("topic"),
            Self::Fanout => f.write_str("fanout"),
        }
    }
}

/// Broker-level address for one event kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// Exchange the event is published to.
    pub exchange: String,
    /// Routing key used for publishing and queue binding.
    pub key: String,
    /// Queue bound to the exchange for consumption.
    pub queue: String,
    /// Exchange kind.
    pub kind: ExchangeKind,
}

impl Route {
    /// Create a direct-exchange route.
    #[must_use]
    pub fn direct(
        exchange: impl Into<String>,
        key: impl Into<String>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            key: key.into(),
            queue: queue.into(),
            kind: ExchangeKind::Direct,
        }
    }
}

/// Errors from route resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The event has no registered route.
    #[error("no route registered for {0}")]
    Unregistered(Event),
}

/// Mapping from event identifiers to broker routes.
///
/// Read-mostly: populated at gateway construction and read on every publish
/// and subscribe. The table itself is a plain map; callers that re-register
/// concurrently with reads wrap it in a lock (the gateway does).
///
/// # Example
///
/// ```
/// use eventbuss_core::{Event, RouteTable};
///
/// let table = RouteTable::with_defaults("orders-svc");
/// let route = table.resolve(Event::USER_REGISTRATION).unwrap();
/// assert_eq!(route.exchange, "event_buss_exch_user_register");
/// assert_eq!(route.queue, "orders-svc");
///
/// assert!(table.resolve(Event::new(99)).is_err());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: HashMap<Event, Route>,
}

impl RouteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the built-in events bound under `queue`.
    #[must_use]
    pub fn with_defaults(queue: &str) -> Self {
        let mut table = Self::new();
        table.register(queue);
        table
    }

    /// (Re)bind every built-in event to its default exchange and key, using
    /// `queue` as the binding queue.
    ///
    /// Overwrites any prior binding for those events; entries for other
    /// events are left untouched.
    pub fn register(&mut self, queue: &str) {
        self.routes.insert(
            Event::USER_REGISTRATION,
            Route::direct(EXCHANGE_USER_REGISTER, KEY_USER_REGISTER, queue),
        );
        self.routes.insert(
            Event::USER_AUTHORIZATION,
            Route::direct(EXCHANGE_USER_AUTHORIZATION, KEY_USER_AUTHORIZATION, queue),
        );
    }

    /// Bind `event` to `route`, returning the previous binding if any.
    ///
    /// Last writer wins, same as [`register`](Self::register).
    pub fn insert(&mut self, event: Event, route: Route) -> Option<Route> {
        self.routes.insert(event, route)
    }

    /// Resolve the route for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Unregistered`] if the event has no binding.
    pub fn resolve(&self, event: Event) -> Result<Route, RouteError> {
        self.routes
            .get(&event)
            .cloned()
            .ok_or(RouteError::Unregistered(event))
    }

    /// Look up the route for `event` without treating a miss as an error.
    #[must_use]
    pub fn get(&self, event: Event) -> Option<&Route> {
        self.routes.get(&event)
    }

    /// Number of bound events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
