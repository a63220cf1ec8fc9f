//! One-shot topic subscription
//!
//! The subscription is issued once, right after connect. With the
//! clean-session flag off the broker keeps it across sessions for this
//! client identifier, and messages queued while the client was away replay
//! after the next connect.

use rumqttc::QoS;
use tracing::info;

use crate::session::{Channel, OperationError};

/// Subscribe to `topic` at least-once and wait for broker confirmation
pub async fn subscribe_once<C: Channel>(channel: &C, topic: &str) -> Result<(), OperationError> {
    let token = channel.subscribe(topic, QoS::AtLeastOnce).await?;
    token.wait().await?;
    info!(topic = %topic, "Subscription confirmed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChannel;

    #[tokio::test]
    async fn test_subscribes_at_least_once() {
        let mock = MockChannel::new();

        subscribe_once(&mock, "t/1").await.expect("should confirm");

        let subscribed = mock.subscribed().await;
        assert_eq!(subscribed, vec![("t/1".to_string(), QoS::AtLeastOnce)]);
    }

    #[tokio::test]
    async fn test_request_failure_propagates() {
        let mock = MockChannel::with_failure();

        let err = subscribe_once(&mock, "t/1").await.unwrap_err();
        assert!(matches!(err, OperationError::NotConnected { .. }));
    }
}
