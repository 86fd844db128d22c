//! Typed publish/subscribe facade over a supervised broker connection.
//!
//! [`EventBuss`] lets application code publish typed events and subscribe
//! handlers to them while the crates underneath provide routing
//! (`eventbuss-core`), connection supervision with retries and a circuit
//! breaker (`eventbuss-runtime`), and the broker binding (`eventbuss-amqp`
//! in production, `eventbuss-testing` in tests).
//!
//! # Delivery semantics
//!
//! - **Publishing** is at-most-once from the caller's perspective: each
//!   `push` resolves to exactly one of confirmed, rejected, or timed out,
//!   and pre-emission failures (unknown route, encoding failure, no
//!   connection) fail closed before anything reaches the broker.
//! - **Consuming** is at-most-once, best-effort dispatch: messages are
//!   acknowledged before the handler runs, so a failing handler loses that
//!   message rather than seeing it again. See [`consume`].
//!
//! # Example
//!
//! ```no_run
//! use eventbuss_core::Event;
//! use eventbuss_gateway::EventBuss;
//! use std::sync::Arc;
//!
//! # async fn example(broker: Arc<dyn eventbuss_core::Broker>) -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBuss::builder()
//!     .service_name("orders-svc")
//!     .build(broker)?;
//!
//! let outcome = bus
//!     .push(Event::USER_REGISTRATION, &serde_json::json!({ "id": 7 }))
//!     .await?;
//! assert!(outcome.is_confirmed());
//!
//! bus.listen(Event::USER_REGISTRATION, |payload: Vec<u8>| async move {
//!     println!("got {} bytes", payload.len());
//!     Ok::<(), std::convert::Infallible>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

/// Error taxonomy of the gateway surface.
pub mod error;

/// The acknowledge-then-dispatch loop.
pub mod consume;

/// Fan-out across multiple event subscriptions.
pub mod multi;

mod publish;

pub use consume::ListenOutcome;
pub use error::{ConfigError, ListenError, PublishError};
pub use multi::{EventHandler, FanoutMode, FanoutOutcome, HandlerError, ListenerSet, handler};

use eventbuss_core::{
    Broker, Codec, Event, JsonCodec, Message, PublishOutcome, Route, RouteTable,
};
use eventbuss_runtime::{ConnectionSupervisor, ConnectorConfig, StateChangeFn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

const DEFAULT_SERVICE_NAME: &str = "event-buss";
const DEFAULT_PUBLISH_DEADLINE: Duration = Duration::from_secs(3);

struct Inner<C> {
    codec: C,
    routes: RwLock<RouteTable>,
    supervisor: ConnectionSupervisor,
    publish_deadline: Duration,
    verbose: bool,
}

/// The message-bus gateway.
///
/// Cheap to clone; clones share the route table and supervisor. Each
/// publish call drives its own short-lived connection, each listen call its
/// own long-lived one, so concurrent calls never contend on a connection.
pub struct EventBuss<C: Codec = JsonCodec> {
    inner: Arc<Inner<C>>,
}

impl<C: Codec> Clone for EventBuss<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Codec> fmt::Debug for EventBuss<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuss")
            .field("publish_deadline", &self.inner.publish_deadline)
            .field("verbose", &self.inner.verbose)
            .finish_non_exhaustive()
    }
}

impl EventBuss<JsonCodec> {
    /// Start configuring a gateway with the JSON codec.
    #[must_use]
    pub fn builder() -> EventBussBuilder<JsonCodec> {
        EventBussBuilder::default()
    }
}

impl<C: Codec> EventBuss<C> {
    /// Publish `payload` for `event` and wait for a terminal outcome.
    ///
    /// The route is resolved and the payload encoded before any connection
    /// is opened; a failure in either aborts the call with nothing sent.
    /// The connection is torn down on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] for pre-emission failures (unknown route,
    /// encoding failure, connection failure, submission failure). A message
    /// that reached the broker resolves to `Ok` with one of the three
    /// [`PublishOutcome`]s instead.
    pub async fn push<T: Serialize>(
        &self,
        event: Event,
        payload: &T,
    ) -> Result<PublishOutcome, PublishError> {
        let route = self.inner.routes.read().await.resolve(event)?;
        let bytes = self.inner.codec.encode(payload)?;

        let conn = self.inner.supervisor.connect().await?;
        let raced = publish::emit_and_race(
            conn.connection(),
            Message::persistent(route, bytes),
            self.inner.publish_deadline,
        )
        .await;
        if let Err(err) = self.inner.supervisor.close(conn).await {
            tracing::warn!(%event, error = %err, "failed to close publish connection");
        }

        let outcome = raced?;
        match &outcome {
            PublishOutcome::Confirmed => {
                if self.inner.verbose {
                    tracing::info!(%event, "message confirmed");
                } else {
                    tracing::debug!(%event, "message confirmed");
                }
            }
            PublishOutcome::Rejected(reason) => {
                tracing::error!(%event, %reason, "message rejected by broker");
            }
            PublishOutcome::TimedOut => {
                tracing::error!(%event, "publish deadline elapsed without a broker verdict");
            }
        }
        Ok(outcome)
    }

    /// Subscribe `handler` to `event` and dispatch until the subscription
    /// closes.
    ///
    /// Handler errors are logged and do not stop the loop or trigger
    /// redelivery (at-most-once; see [`consume`]). The connection is torn
    /// down on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`ListenError`] if the route is unknown, the connection
    /// could not be established, or the subscription could not be opened.
    pub async fn listen<F, Fut, E>(
        &self,
        event: Event,
        mut handler: F,
    ) -> Result<ListenOutcome, ListenError>
    where
        F: FnMut(Vec<u8>) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        E: fmt::Display,
    {
        let route = self.inner.routes.read().await.resolve(event)?;
        let conn = self.inner.supervisor.connect().await?;

        let result = consume::run_loop(
            conn.connection(),
            &route,
            event,
            self.inner.verbose,
            &mut handler,
        )
        .await;

        if let Err(err) = self.inner.supervisor.close(conn).await {
            tracing::warn!(%event, error = %err, "failed to close consumer connection");
        }
        result
    }

    /// Re-register the default routes under a new binding queue name.
    ///
    /// Last writer wins; in-flight calls keep the route they already
    /// resolved.
    pub async fn register_routes(&self, queue: &str) {
        self.inner.routes.write().await.register(queue);
    }

    /// Resolve the current route for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`eventbuss_core::RouteError::Unregistered`] on a miss.
    pub async fn route_for(&self, event: Event) -> Result<Route, eventbuss_core::RouteError> {
        self.inner.routes.read().await.resolve(event)
    }
}

impl<C: Codec + 'static> EventBuss<C> {
    /// Spawn one consumer task per (event, handler) pair.
    #[must_use]
    pub fn spawn_listeners(&self, pairs: Vec<(Event, EventHandler)>) -> ListenerSet {
        let mut tasks = JoinSet::new();
        for (event, handler) in pairs {
            let bus = self.clone();
            tasks.spawn(async move { (event, bus.listen(event, handler).await) });
        }
        ListenerSet::new(tasks)
    }

    /// Start a consumer for every (event, handler) pair.
    ///
    /// Every pair runs as its own concurrent task regardless of `mode`;
    /// the mode only decides whether the call returns the running set
    /// immediately ([`FanoutMode::Detached`]) or blocks until every
    /// consumer terminates ([`FanoutMode::Await`]).
    pub async fn listen_all(
        &self,
        pairs: Vec<(Event, EventHandler)>,
        mode: FanoutMode,
    ) -> FanoutOutcome {
        let set = self.spawn_listeners(pairs);
        match mode {
            FanoutMode::Detached => FanoutOutcome::Detached(set),
            FanoutMode::Await => FanoutOutcome::Completed(set.join().await),
        }
    }
}

/// Builder for [`EventBuss`], validated at [`build`](Self::build).
///
/// Replaces ad-hoc option functions with named fields: every recognized
/// option is a method here and nothing is silently ignored.
pub struct EventBussBuilder<C: Codec = JsonCodec> {
    service: String,
    overrides: Vec<(Event, Route)>,
    verbose: bool,
    codec: C,
    publish_deadline: Duration,
    connector: ConnectorConfig,
    on_state_change: Option<Arc<StateChangeFn>>,
}

impl Default for EventBussBuilder<JsonCodec> {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE_NAME.to_string(),
            overrides: Vec::new(),
            verbose: false,
            codec: JsonCodec,
            publish_deadline: DEFAULT_PUBLISH_DEADLINE,
            connector: ConnectorConfig::default(),
            on_state_change: None,
        }
    }
}

impl<C: Codec> EventBussBuilder<C> {
    /// Service name, used as the binding queue for default routes.
    #[must_use]
    pub fn service_name(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Bind `event` to `route`, overriding any default.
    #[must_use]
    pub fn route_override(mut self, event: Event, route: Route) -> Self {
        self.overrides.push((event, route));
        self
    }

    /// Log per-message activity at info level instead of debug.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Replace the payload codec.
    #[must_use]
    pub fn codec<D: Codec>(self, codec: D) -> EventBussBuilder<D> {
        EventBussBuilder {
            service: self.service,
            overrides: self.overrides,
            verbose: self.verbose,
            codec,
            publish_deadline: self.publish_deadline,
            connector: self.connector,
            on_state_change: self.on_state_change,
        }
    }

    /// Deadline for the publish confirm race. Default: 3 seconds.
    #[must_use]
    pub const fn publish_deadline(mut self, deadline: Duration) -> Self {
        self.publish_deadline = deadline;
        self
    }

    /// Connection retry and circuit-breaker policy.
    #[must_use]
    pub fn connector(mut self, config: ConnectorConfig) -> Self {
        self.connector = config;
        self
    }

    /// Observer for connection state transitions.
    #[must_use]
    pub fn on_state_change(mut self, observer: Arc<StateChangeFn>) -> Self {
        self.on_state_change = Some(observer);
        self
    }

    /// Build the gateway over `broker`, registering default routes under
    /// the service name and applying overrides on top.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the service name is empty, the connect
    /// attempts are zero, or the publish deadline is zero.
    pub fn build(self, broker: Arc<dyn Broker>) -> Result<EventBuss<C>, ConfigError> {
        if self.service.is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.connector.attempts == 0 {
            return Err(ConfigError::ZeroConnectAttempts);
        }
        if self.publish_deadline.is_zero() {
            return Err(ConfigError::ZeroPublishDeadline);
        }

        let mut routes = RouteTable::with_defaults(&self.service);
        for (event, route) in self.overrides {
            routes.insert(event, route);
        }

        let mut supervisor = ConnectionSupervisor::new(self.service.clone(), broker, &self.connector);
        if let Some(observer) = self.on_state_change {
            supervisor = supervisor.with_state_change(observer);
        }

        tracing::info!(
            service = %self.service,
            routes = routes.len(),
            deadline_ms = self.publish_deadline.as_millis(),
            "gateway constructed"
        );

        Ok(EventBuss {
            inner: Arc::new(Inner {
                codec: self.codec,
                routes: RwLock::new(routes),
                supervisor,
                publish_deadline: self.publish_deadline,
                verbose: self.verbose,
            }),
        })
    }
}
