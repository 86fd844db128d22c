//! The publish race: confirm, reject, or deadline.

use eventbuss_core::{Connection, EmitAck, Message, PublishOutcome};
use std::time::Duration;
use tokio::time::timeout;

/// Submit `message` and race the broker's verdict against `deadline`.
///
/// The race is single-shot: the first of confirm, reject, or deadline expiry
/// decides the outcome and the other arms are discarded. A broker that
/// answers after the deadline is ignored.
///
/// Errors here mean the message never left: submission itself failed.
pub(crate) async fn emit_and_race(
    connection: &dyn Connection,
    message: Message,
    deadline: Duration,
) -> Result<PublishOutcome, eventbuss_core::BrokerError> {
    let ack = connection.emit(message).await?;

    let outcome = match timeout(deadline, ack).await {
        Ok(EmitAck::Confirmed) => PublishOutcome::Confirmed,
        Ok(EmitAck::Rejected(reason)) => PublishOutcome::Rejected(reason),
        Err(_elapsed) => PublishOutcome::TimedOut,
    };
    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use eventbuss_core::{Broker, Route};
    use eventbuss_testing::{AckMode, InMemoryBroker};

    fn message() -> Message {
        Message::persistent(Route::direct("exch", "key", "queue"), vec![1])
    }

    #[tokio::test]
    async fn confirm_wins_the_race() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect().await.unwrap();
        let outcome = emit_and_race(conn.as_ref(), message(), Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Confirmed);
    }

    #[tokio::test]
    async fn reject_wins_with_its_reason() {
        let broker = InMemoryBroker::new();
        broker.set_ack_mode(AckMode::Reject("queue full".into()));
        let conn = broker.connect().await.unwrap();
        let outcome = emit_and_race(conn.as_ref(), message(), Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Rejected("queue full".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_resolves_to_timeout_at_the_deadline() {
        let broker = InMemoryBroker::new();
        broker.set_ack_mode(AckMode::Never);
        let conn = broker.connect().await.unwrap();

        let start = tokio::time::Instant::now();
        let outcome = emit_and_race(conn.as_ref(), message(), Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }
}
