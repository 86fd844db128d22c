//! # EventBuss Runtime
//!
//! Connection supervision for the EventBuss gateway.
//!
//! This crate owns the policy side of the broker link, everything between
//! "the gateway wants a connection" and "the broker client returned one":
//!
//! - **[`retry`]**: bounded fixed-delay retry for connect attempts
//! - **[`circuit_breaker`]**: fail-fast once the broker looks down
//! - **[`supervisor`]**: ties both together, reports state transitions, and
//!   runs each connection's maintenance loop as an independent task
//!
//! ## Example
//!
//! ```ignore
//! use eventbuss_runtime::{ConnectionSupervisor, ConnectorConfig};
//!
//! let supervisor = ConnectionSupervisor::new("publisher", broker, &ConnectorConfig::default());
//! let conn = supervisor.connect().await?;
//! // ... emit or subscribe through conn.connection() ...
//! supervisor.close(conn).await?;
//! ```

/// Fixed-delay retry for connect attempts.
pub mod retry;

/// Failure-threshold circuit breaker for the broker link.
pub mod circuit_breaker;

/// Broker connection lifecycle under retry and circuit-breaking.
pub mod supervisor;

pub use circuit_breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
pub use retry::{RetryPolicy, retry_with_policy};
pub use supervisor::{
    ConnectError, ConnectionSupervisor, ConnectorConfig, StateChangeFn, SupervisedConnection,
};
