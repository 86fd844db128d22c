//! Fan-out across multiple event subscriptions.
//!
//! [`listen_all`](crate::EventBuss::listen_all) starts one consumer per
//! (event, handler) pair. Every consumer always runs as its own task; the
//! [`FanoutMode`] only decides whether the caller gets the set back
//! immediately or blocks until every consumer terminates. (An earlier
//! incarnation of this gateway blocked the caller inside the first pair's
//! loop while the rest ran in the background; that asymmetry was an
//! accident of iteration order, not a contract, and is gone.)

use crate::consume::ListenOutcome;
use crate::error::ListenError;
use eventbuss_core::Event;
use std::pin::Pin;
use tokio::task::JoinSet;

/// Error type produced by boxed event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A boxed handler invoked with each consumed payload.
pub type EventHandler =
    Box<dyn FnMut(Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>> + Send>;

/// Box an async closure into an [`EventHandler`].
///
/// ```
/// use eventbuss_gateway::multi::handler;
///
/// let h = handler(|payload: Vec<u8>| async move {
///     let _ = payload;
///     Ok::<(), std::convert::Infallible>(())
/// });
/// # let _ = h;
/// ```
pub fn handler<F, Fut, E>(mut f: F) -> EventHandler
where
    F: FnMut(Vec<u8>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError>,
{
    Box::new(move |payload| {
        let fut = f(payload);
        Box::pin(async move { fut.await.map_err(Into::into) })
    })
}

/// Whether `listen_all` hands back control or waits for the set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FanoutMode {
    /// Return a [`ListenerSet`] as soon as every consumer is spawned.
    Detached,
    /// Block until every consumer terminates and return their outcomes.
    Await,
}

/// Result of a `listen_all` call, shaped by its [`FanoutMode`].
#[derive(Debug)]
pub enum FanoutOutcome {
    /// Consumers are running; the caller owns the set.
    Detached(ListenerSet),
    /// Every consumer terminated with the given per-event results.
    Completed(Vec<(Event, Result<ListenOutcome, ListenError>)>),
}

/// Handle over a set of running consumers.
///
/// Dropping the set aborts every consumer in it.
#[derive(Debug)]
pub struct ListenerSet {
    tasks: JoinSet<(Event, Result<ListenOutcome, ListenError>)>,
}

impl ListenerSet {
    pub(crate) fn new(tasks: JoinSet<(Event, Result<ListenOutcome, ListenError>)>) -> Self {
        Self { tasks }
    }

    /// Number of consumers still tracked by the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the set tracks no consumers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every consumer to terminate and collect their outcomes.
    ///
    /// A consumer that panicked or was aborted is logged and omitted from
    /// the results.
    pub async fn join(mut self) -> Vec<(Event, Result<ListenOutcome, ListenError>)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(pair) => outcomes.push(pair),
                Err(err) => tracing::error!(error = %err, "consumer task did not terminate cleanly"),
            }
        }
        outcomes
    }

    /// Abort every consumer in the set.
    pub fn abort_all(mut self) {
        self.tasks.abort_all();
    }
}
