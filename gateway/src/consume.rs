//! The acknowledge-then-dispatch loop.
//!
//! Delivery policy is at-most-once, best-effort dispatch: every message is
//! acknowledged (non-requeue) before its handler runs, so a failing handler
//! loses that message instead of triggering redelivery. This mirrors the
//! behavior consumers of this gateway have always relied on; moving to
//! at-least-once would mean acknowledging after the handler and accepting
//! duplicate dispatches.

use crate::error::ListenError;
use eventbuss_core::{Connection, Event, Route};
use futures::StreamExt;
use std::fmt;

/// Terminal state of a listen call that made it into its dispatch loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ListenOutcome {
    /// The subscription channel closed.
    Stopped,
}

pub(crate) async fn run_loop<F, Fut, E>(
    connection: &dyn Connection,
    route: &Route,
    event: Event,
    verbose: bool,
    handler: &mut F,
) -> Result<ListenOutcome, ListenError>
where
    F: FnMut(Vec<u8>) -> Fut + Send,
    Fut: Future<Output = Result<(), E>> + Send,
    E: fmt::Display,
{
    let mut deliveries = connection
        .subscribe(route)
        .await
        .map_err(ListenError::Subscribe)?;

    tracing::info!(%event, queue = %route.queue, "listening for messages");

    loop {
        match deliveries.next().await {
            None => {
                tracing::info!(%event, "subscription closed, stopping");
                return Ok(ListenOutcome::Stopped);
            }
            Some(Err(err)) => {
                tracing::warn!(%event, error = %err, "transport error on subscription");
            }
            Some(Ok(delivery)) => {
                let payload = delivery.payload().to_vec();

                // Ack before dispatch: at-most-once, no redelivery on
                // handler failure.
                if let Err(err) = delivery.ack().await {
                    tracing::warn!(%event, error = %err, "acknowledgment failed");
                }

                if verbose {
                    tracing::info!(%event, bytes = payload.len(), "message consumed");
                } else {
                    tracing::debug!(%event, bytes = payload.len(), "message consumed");
                }

                if let Err(err) = handler(payload).await {
                    tracing::error!(
                        %event,
                        error = %err,
                        "handler failed; message was already acknowledged"
                    );
                }
            }
        }
    }
}
