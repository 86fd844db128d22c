//! Broker connection lifecycle under retry and circuit-breaking.
//!
//! The [`ConnectionSupervisor`] owns the policy side of the broker link:
//! bounded fixed-delay retries around each connect, a consecutive-failure
//! circuit breaker that fails fast once the broker looks down, state-change
//! reporting for observability, and the background maintenance task of every
//! connection it hands out.
//!
//! A successful [`connect`](ConnectionSupervisor::connect) yields a
//! [`SupervisedConnection`] guard. Its maintenance loop is already running
//! as an independent task, so publishing and consuming are never blocked by
//! it, and dropping the guard aborts the task even on panic paths. Callers
//! return the guard through [`close`](ConnectionSupervisor::close) on every
//! exit path so broker resources are released deterministically.

use crate::circuit_breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
use crate::retry::{RetryPolicy, retry_with_policy};
use eventbuss_core::{Broker, BrokerError, Connection, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Observer invoked on every connection state transition with
/// `(component name, previous state, new state)`.
///
/// A side channel for observability only; it never affects the
/// success or failure of connect, run, or close.
pub type StateChangeFn = dyn Fn(&str, ConnectionState, ConnectionState) + Send + Sync;

/// Connection policy configuration.
///
/// Defaults mirror the gateway's stock wiring: 5 connect attempts 2 seconds
/// apart, circuit opens after 3 consecutive exhausted connects, one minute
/// cool-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Connect attempts per call, including the first.
    pub attempts: usize,
    /// Fixed delay between attempts.
    pub sleep: Duration,
    /// Consecutive exhausted connect calls before the circuit opens.
    pub threshold: usize,
    /// How long the circuit stays open before a probe is admitted.
    pub cool_down: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            sleep: Duration::from_secs(2),
            threshold: 3,
            cool_down: Duration::from_secs(60),
        }
    }
}

/// Errors from supervised connect calls.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The circuit breaker rejected the call without touching the network.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Every connect attempt failed; carries the final broker error.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A live connection plus its spawned maintenance task.
pub struct SupervisedConnection {
    connection: Box<dyn Connection>,
    maintenance: JoinHandle<()>,
}

impl SupervisedConnection {
    fn start(connection: Box<dyn Connection>) -> Self {
        let maintenance = tokio::spawn(connection.run());
        Self {
            connection,
            maintenance,
        }
    }

    /// The underlying broker connection.
    #[must_use]
    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    async fn shutdown(&self) -> Result<(), BrokerError> {
        self.maintenance.abort();
        self.connection.close().await
    }
}

impl Drop for SupervisedConnection {
    fn drop(&mut self) {
        // Abort is idempotent; this is the safety net for non-close exits.
        self.maintenance.abort();
    }
}

impl std::fmt::Debug for SupervisedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedConnection")
            .field("maintenance_finished", &self.maintenance.is_finished())
            .finish_non_exhaustive()
    }
}

/// Supervises broker connections for one gateway component.
pub struct ConnectionSupervisor {
    name: String,
    broker: Arc<dyn Broker>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    on_state_change: Option<Arc<StateChangeFn>>,
    state: Mutex<ConnectionState>,
}

impl ConnectionSupervisor {
    /// Create a supervisor over `broker` with the given policy.
    #[must_use]
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>, config: &ConnectorConfig) -> Self {
        Self {
            name: name.into(),
            broker,
            retry: RetryPolicy::new(config.attempts, config.sleep),
            breaker: CircuitBreaker::new(BreakerConfig::new(config.threshold, config.cool_down)),
            on_state_change: None,
            state: Mutex::new(ConnectionState::Closed),
        }
    }

    /// Attach a state-change observer.
    #[must_use]
    pub fn with_state_change(mut self, observer: Arc<StateChangeFn>) -> Self {
        self.on_state_change = Some(observer);
        self
    }

    /// The component name used in state-change notifications.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last reported connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Establish a connection under the retry and circuit-breaker policy and
    /// start its maintenance loop.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::CircuitOpen`] when the breaker rejects the
    /// call outright, or [`ConnectError::Broker`] once every attempt of this
    /// call has failed.
    pub async fn connect(&self) -> Result<SupervisedConnection, ConnectError> {
        self.transition(ConnectionState::Connecting).await;

        let attempt = self
            .breaker
            .call(|| retry_with_policy(&self.retry, || self.broker.connect()))
            .await;

        match attempt {
            Ok(connection) => {
                self.transition(ConnectionState::Open).await;
                Ok(SupervisedConnection::start(connection))
            }
            Err(BreakerError::Open) => {
                self.transition(ConnectionState::CircuitOpen).await;
                Err(ConnectError::CircuitOpen)
            }
            Err(BreakerError::Inner(err)) => {
                let next = if self.breaker.state().await == BreakerState::Open {
                    ConnectionState::CircuitOpen
                } else {
                    ConnectionState::Closed
                };
                self.transition(next).await;
                tracing::error!(
                    component = %self.name,
                    error = %err,
                    "broker connection attempts exhausted"
                );
                Err(ConnectError::Broker(err))
            }
        }
    }

    /// Tear down a supervised connection and report the transition.
    ///
    /// # Errors
    ///
    /// Returns the broker's teardown error, after the maintenance task has
    /// been aborted and the state transition reported either way.
    pub async fn close(&self, connection: SupervisedConnection) -> Result<(), BrokerError> {
        let result = connection.shutdown().await;
        drop(connection);
        self.transition(ConnectionState::Closed).await;
        result
    }

    async fn transition(&self, to: ConnectionState) {
        let from = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, to)
        };
        if from == to {
            return;
        }
        tracing::info!(component = %self.name, %from, %to, "connection state changed");
        if let Some(observer) = &self.on_state_change {
            observer(&self.name, from, to);
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
