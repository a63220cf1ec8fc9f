//! Mock implementations for testing
//!
//! Provides a mock `Channel` so workers can be tested without an external
//! broker. The mock runs operations through a real `AckRegistry`, so the
//! tokens it hands out resolve with the same machinery production uses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::QoS;
use tokio::sync::Mutex;

use crate::session::{
    AckRegistry, Channel, CompletionToken, DeliveryToken, Message, OperationError, SessionState,
};

/// Mock channel for testing
///
/// Three behaviors, chosen at construction: `new` acknowledges every
/// operation immediately, `manual` leaves deliveries pending until the test
/// releases them, and `with_failure` rejects every call.
#[derive(Clone)]
pub struct MockChannel {
    pub published: Arc<Mutex<Vec<Message>>>,
    pub subscribed: Arc<Mutex<Vec<(String, QoS)>>>,
    registry: Arc<Mutex<AckRegistry>>,
    outstanding: Arc<Mutex<VecDeque<u16>>>,
    next_packet_id: Arc<AtomicU16>,
    auto_ack: bool,
    should_fail: bool,
}

impl MockChannel {
    /// Every publish and subscribe is acknowledged before the token returns
    pub fn new() -> Self {
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
            subscribed: Arc::new(Mutex::new(Vec::new())),
            registry: Arc::new(Mutex::new(AckRegistry::new())),
            outstanding: Arc::new(Mutex::new(VecDeque::new())),
            next_packet_id: Arc::new(AtomicU16::new(1)),
            auto_ack: true,
            should_fail: false,
        }
    }

    /// Deliveries stay pending until the test calls `deliver_next`
    pub fn manual() -> Self {
        Self {
            auto_ack: false,
            ..Self::new()
        }
    }

    /// Every operation fails at the request stage
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Messages recorded so far, in publish order
    pub async fn published(&self) -> Vec<Message> {
        self.published.lock().await.clone()
    }

    /// Subscriptions recorded so far
    pub async fn subscribed(&self) -> Vec<(String, QoS)> {
        self.subscribed.lock().await.clone()
    }

    /// Number of publishes awaiting a manual delivery acknowledgment
    pub async fn pending_deliveries(&self) -> usize {
        self.outstanding.lock().await.len()
    }

    /// Acknowledge the oldest pending delivery; true if one existed
    pub async fn deliver_next(&self) -> bool {
        let Some(packet_id) = self.outstanding.lock().await.pop_front() else {
            return false;
        };
        self.registry.lock().await.publish_acked(packet_id);
        true
    }

    /// Fail everything still pending, as a lost connection would
    pub async fn drop_connection(&self, reason: &str) {
        self.outstanding.lock().await.clear();
        self.registry.lock().await.fail_all(reason);
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(&self, message: Message) -> Result<DeliveryToken, OperationError> {
        if self.should_fail {
            return Err(OperationError::NotConnected {
                state: SessionState::Disconnected,
            });
        }

        self.published.lock().await.push(message);

        let packet_id = self.next_packet_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.lock().await;
        let token = registry.expect_publish();
        registry.publish_sent(packet_id);
        if self.auto_ack {
            registry.publish_acked(packet_id);
        } else {
            self.outstanding.lock().await.push_back(packet_id);
        }
        Ok(token)
    }

    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
    ) -> Result<CompletionToken<()>, OperationError> {
        if self.should_fail {
            return Err(OperationError::NotConnected {
                state: SessionState::Disconnected,
            });
        }

        self.subscribed.lock().await.push((filter.to_string(), qos));

        let packet_id = self.next_packet_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.lock().await;
        let token = registry.expect_subscribe();
        registry.subscribe_sent(packet_id);
        registry.subscribe_acked(packet_id, Ok(()));
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_ack_resolves_before_wait() {
        let mock = MockChannel::new();
        let token = mock
            .publish(Message::at_least_once("t/1", "hello"))
            .await
            .expect("publish should succeed");

        assert_eq!(token.wait().await, Ok(1));
        assert_eq!(mock.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_mode_holds_delivery_until_released() {
        let mock = MockChannel::manual();
        let token = mock
            .publish(Message::at_least_once("t/1", "hello"))
            .await
            .expect("publish should succeed");

        assert_eq!(mock.pending_deliveries().await, 1);
        assert!(mock.deliver_next().await);
        assert_eq!(token.wait().await, Ok(1));
        assert!(!mock.deliver_next().await);
    }

    #[tokio::test]
    async fn test_failure_mode_rejects_operations() {
        let mock = MockChannel::with_failure();
        let err = mock
            .publish(Message::at_least_once("t/1", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::NotConnected { .. }));
        assert!(mock.published().await.is_empty());
    }
}
