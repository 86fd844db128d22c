//! Failure-threshold circuit breaker for the broker link.
//!
//! After a run of consecutive connect failures the breaker opens and connect
//! calls fail fast, without a network round trip, until a cool-down elapses.
//! The first call after the cool-down is a probe: its success closes the
//! circuit, its failure reopens it.
//!
//! # States
//!
//! - **Closed**: attempts pass through; consecutive failures are counted.
//! - **Open**: attempts are rejected immediately until the cool-down passes.
//! - **HalfOpen**: one probe attempt is admitted to test recovery.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub threshold: usize,
    /// How long the circuit stays open before admitting a probe.
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            cool_down: Duration::from_secs(60),
        }
    }
}

impl BreakerConfig {
    /// Create a configuration with the given threshold and cool-down.
    #[must_use]
    pub const fn new(threshold: usize, cool_down: Duration) -> Self {
        Self {
            threshold,
            cool_down,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Admitting a recovery probe.
    HalfOpen,
}

/// Error wrapper distinguishing fast rejection from operation failure.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was never attempted.
    #[error("circuit breaker is open")]
    Open,
    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker.
///
/// Cheap to share: internal state sits behind an async mutex, and `call`
/// holds it only around state bookkeeping, never across the wrapped
/// operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker in the closed state.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state, resolving an elapsed cool-down to `HalfOpen`.
    pub async fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().await;
        self.refresh(&mut inner);
        inner.state
    }

    /// Run `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] without running the operation when the
    /// circuit is open, or [`BreakerError::Inner`] when the operation ran
    /// and failed.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            tracing::warn!("circuit breaker open, rejecting attempt");
            return Err(BreakerError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await;
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Force the breaker back to closed. Intended for tests and manual
    /// intervention.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        tracing::info!("circuit breaker reset to closed");
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    // Transitions Open -> HalfOpen once the cool-down has elapsed.
    fn refresh(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            let cooled = inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.cool_down);
            if cooled {
                tracing::info!("circuit breaker open -> half-open");
                inner.state = BreakerState::HalfOpen;
            }
        }
    }

    async fn admit(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.refresh(&mut inner);
        matches!(inner.state, BreakerState::Closed | BreakerState::HalfOpen)
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == BreakerState::HalfOpen {
            tracing::info!("circuit breaker half-open -> closed (probe succeeded)");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.threshold {
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        threshold = self.config.threshold,
                        "circuit breaker closed -> open"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!("circuit breaker half-open -> open (probe failed)");
                inner.state = BreakerState::Open;
                inner.consecutive_failures += 1;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Open => {
                inner.consecutive_failures += 1;
            }
        }
    }
}
