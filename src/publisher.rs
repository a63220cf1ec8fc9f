//! Periodic message publisher
//!
//! Publishes a numbered message every two seconds until shutdown is
//! requested. Each message waits for its delivery acknowledgment before the
//! loop moves on, so at most one publish is ever in flight.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::session::{Channel, Message, OperationError};
use crate::shutdown::ShutdownSignal;

/// Delay between consecutive publishes
pub const PUBLISH_INTERVAL: Duration = Duration::from_secs(2);

/// Run the publish loop; returns the number of confirmed deliveries
///
/// The stop flag is honored at the top of each iteration and during the
/// between-message delay, never while a delivery wait is in flight: an
/// acknowledgment that has been asked for is always waited out. A failed
/// publish is reported and the loop continues; its sequence number is
/// consumed either way.
pub async fn run_publisher<C: Channel>(
    channel: C,
    topic: String,
    text: String,
    shutdown: ShutdownSignal,
) -> u64 {
    let mut delivered = 0u64;
    for sequence in 1u64.. {
        if shutdown.is_stopped() {
            break;
        }

        match publish_numbered(&channel, &topic, &text, sequence).await {
            Ok(message_id) => {
                delivered += 1;
                info!(sequence, message_id, topic = %topic, "Delivery confirmed");
            }
            Err(error) => {
                warn!(sequence, error = %error, "Publish failed, continuing");
            }
        }

        tokio::select! {
            _ = shutdown.stopped() => {}
            _ = tokio::time::sleep(PUBLISH_INTERVAL) => {}
        }
    }

    info!(delivered, "Publisher stopped");
    delivered
}

/// Publish one numbered message and wait for its acknowledgment
async fn publish_numbered<C: Channel>(
    channel: &C,
    topic: &str,
    text: &str,
    sequence: u64,
) -> Result<u16, OperationError> {
    let payload = compose_payload(text, sequence);
    debug!(sequence, topic = %topic, payload = %payload, "Publishing");

    let token = channel.publish(Message::at_least_once(topic, payload)).await?;
    let message_id = token.wait().await?;
    Ok(message_id)
}

/// Compose the payload for one publish (pure function)
fn compose_payload(text: &str, sequence: u64) -> String {
    format!("{text} #{sequence}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChannel;

    #[test]
    fn test_payload_carries_text_and_sequence() {
        assert_eq!(compose_payload("Hello MQTT from Rust!", 1), "Hello MQTT from Rust! #1");
        assert_eq!(compose_payload("hi", 42), "hi #42");
    }

    #[tokio::test]
    async fn test_stop_before_first_iteration_publishes_nothing() {
        let mock = MockChannel::new();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let delivered = run_publisher(
            mock.clone(),
            "t/1".to_string(),
            "hi".to_string(),
            shutdown,
        )
        .await;

        assert_eq!(delivered, 0);
        assert!(mock.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_publish_is_not_fatal() {
        let mock = MockChannel::with_failure();
        let shutdown = ShutdownSignal::new();

        let loop_task = {
            let shutdown = shutdown.clone();
            tokio::spawn(run_publisher(
                mock,
                "t/1".to_string(),
                "hi".to_string(),
                shutdown,
            ))
        };

        // Give the loop one failed attempt, then stop it
        tokio::task::yield_now().await;
        shutdown.trigger();

        let delivered = loop_task.await.expect("publisher should not panic");
        assert_eq!(delivered, 0);
    }
}
