//! Session layer: lifecycle, completion tokens, and events
//!
//! One logical broker session. The `SessionManager` establishes it, the
//! `Session` owns its lifecycle, and concurrent workers reach it through the
//! `Channel` seam, which deliberately exposes no lifecycle operations.

pub mod connection;
pub mod events;
pub mod manager;
pub mod token;

use rumqttc::QoS;

pub use connection::{
    can_disconnect, can_operate, configure_session_options, state_after_connection_loss,
    ConnectError, OperationError, SessionState,
};
pub use events::{EventDispatcher, SessionEvent};
pub use manager::{Session, SessionHandle, SessionManager, DISCONNECT_TIMEOUT};
pub use token::{AckError, AckRegistry, CompletionToken, ConnectAck, DeliveryToken};

/// One outbound message, created fresh per publish and immutable after
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl Message {
    /// Build an at-least-once message, the delivery guarantee this system
    /// uses throughout
    pub fn at_least_once(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
        }
    }
}

/// Operations available against a live session
///
/// This trait provides an abstraction over the connected session to enable
/// dependency injection and testing. Holders of a `Channel` can publish and
/// subscribe but never transition the session's lifecycle; that stays with
/// the owner of the `Session`.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    /// Publish a message; the returned token resolves once the broker
    /// acknowledges delivery
    async fn publish(&self, message: Message) -> Result<DeliveryToken, OperationError>;

    /// Subscribe to a topic filter; the returned token resolves once the
    /// broker confirms the subscription
    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
    ) -> Result<CompletionToken<()>, OperationError>;
}
