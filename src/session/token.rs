//! Completion tokens for pending broker acknowledgments
//!
//! Every session operation (connect, subscribe, publish, disconnect) returns
//! a token that the event-loop driver resolves once the matching broker
//! acknowledgment arrives. A token is produced by the operation call and
//! consumed by a single wait; waiting on an already-resolved token returns
//! immediately.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

/// Broker handshake acknowledgment carried by the connect token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAck {
    /// True when the broker restored a persistent session for this client
    /// identifier instead of starting a fresh one
    pub session_present: bool,
}

/// Why a pending acknowledgment resolved negative or will never arrive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckError {
    #[error("Broker rejected the request: {0}")]
    Rejected(String),
    #[error("Connection closed before acknowledgment: {0}")]
    ConnectionClosed(String),
    #[error("Protocol engine stopped before acknowledgment")]
    EngineStopped,
    #[error("Timed out after {0:?} waiting for acknowledgment")]
    TimedOut(Duration),
}

/// Single-use handle for one pending broker acknowledgment
#[derive(Debug)]
pub struct CompletionToken<T = ()> {
    receiver: oneshot::Receiver<Result<T, AckError>>,
}

/// Token for a publish; resolves to the packet id the broker acknowledged
pub type DeliveryToken = CompletionToken<u16>;

impl<T> CompletionToken<T> {
    fn new() -> (oneshot::Sender<Result<T, AckError>>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    /// Wait without bound for the acknowledgment
    ///
    /// Steady-state operations wait unbounded; if the driver stops first the
    /// token resolves with an error rather than hanging.
    pub async fn wait(self) -> Result<T, AckError> {
        self.receiver.await.unwrap_or(Err(AckError::EngineStopped))
    }

    /// Wait with an upper bound
    ///
    /// Only the shutdown disconnect uses this; exceeding the bound yields
    /// `AckError::TimedOut` so the caller can proceed with resource release.
    pub async fn wait_timeout(self, limit: Duration) -> Result<T, AckError> {
        match tokio::time::timeout(limit, self.receiver).await {
            Ok(resolved) => resolved.unwrap_or(Err(AckError::EngineStopped)),
            Err(_) => Err(AckError::TimedOut(limit)),
        }
    }
}

#[derive(Debug)]
struct PendingPublish {
    pkid: Option<u16>,
    done: oneshot::Sender<Result<u16, AckError>>,
}

#[derive(Debug)]
struct PendingSubscribe {
    pkid: Option<u16>,
    done: oneshot::Sender<Result<(), AckError>>,
}

/// Correlates in-flight operations with broker acknowledgments
///
/// The protocol engine assigns packet ids only when it processes a request,
/// and it processes requests in submission order. Registrations therefore
/// queue FIFO and an id announced by the engine attaches to the oldest entry
/// that has none yet.
#[derive(Debug, Default)]
pub struct AckRegistry {
    connect: Option<oneshot::Sender<Result<ConnectAck, AckError>>>,
    publishes: VecDeque<PendingPublish>,
    subscribes: VecDeque<PendingSubscribe>,
    disconnect: Option<oneshot::Sender<Result<(), AckError>>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handshake; at most one connect is ever in flight
    pub fn expect_connect(&mut self) -> CompletionToken<ConnectAck> {
        let (sender, token) = CompletionToken::new();
        self.connect = Some(sender);
        token
    }

    /// Register a publish awaiting its delivery acknowledgment
    pub fn expect_publish(&mut self) -> DeliveryToken {
        let (sender, token) = CompletionToken::new();
        self.publishes.push_back(PendingPublish {
            pkid: None,
            done: sender,
        });
        token
    }

    /// Register a subscribe awaiting broker confirmation
    pub fn expect_subscribe(&mut self) -> CompletionToken<()> {
        let (sender, token) = CompletionToken::new();
        self.subscribes.push_back(PendingSubscribe {
            pkid: None,
            done: sender,
        });
        token
    }

    /// Register the disconnect; resolved when the engine flushes it
    pub fn expect_disconnect(&mut self) -> CompletionToken<()> {
        let (sender, token) = CompletionToken::new();
        self.disconnect = Some(sender);
        token
    }

    /// Withdraw the newest publish registration
    ///
    /// Used when handing the request to the engine fails, so the entry never
    /// shadows a later packet id announcement.
    pub fn abandon_publish(&mut self) {
        self.publishes.pop_back();
    }

    /// Withdraw the newest subscribe registration
    pub fn abandon_subscribe(&mut self) {
        self.subscribes.pop_back();
    }

    /// Attach an engine-assigned packet id to the oldest unassigned publish
    pub fn publish_sent(&mut self, pkid: u16) {
        if let Some(pending) = self.publishes.iter_mut().find(|p| p.pkid.is_none()) {
            pending.pkid = Some(pkid);
        }
    }

    /// Attach an engine-assigned packet id to the oldest unassigned subscribe
    pub fn subscribe_sent(&mut self, pkid: u16) {
        if let Some(pending) = self.subscribes.iter_mut().find(|p| p.pkid.is_none()) {
            pending.pkid = Some(pkid);
        }
    }

    /// Resolve the publish matching an inbound delivery acknowledgment
    ///
    /// Acknowledgments for unknown packet ids are ignored; the engine may
    /// re-deliver acks for messages from a previous run of the session.
    pub fn publish_acked(&mut self, pkid: u16) {
        if let Some(index) = self.publishes.iter().position(|p| p.pkid == Some(pkid)) {
            if let Some(pending) = self.publishes.remove(index) {
                let _ = pending.done.send(Ok(pkid));
            }
        }
    }

    /// Resolve the subscribe matching an inbound confirmation
    pub fn subscribe_acked(&mut self, pkid: u16, outcome: Result<(), String>) {
        if let Some(index) = self.subscribes.iter().position(|p| p.pkid == Some(pkid)) {
            if let Some(pending) = self.subscribes.remove(index) {
                let result = outcome.map_err(AckError::Rejected);
                let _ = pending.done.send(result);
            }
        }
    }

    /// Resolve the handshake positively
    pub fn connect_acked(&mut self, ack: ConnectAck) {
        if let Some(sender) = self.connect.take() {
            let _ = sender.send(Ok(ack));
        }
    }

    /// Resolve the handshake negatively (credentials refused and the like)
    pub fn connect_rejected(&mut self, reason: String) {
        if let Some(sender) = self.connect.take() {
            let _ = sender.send(Err(AckError::Rejected(reason)));
        }
    }

    /// Resolve the disconnect; the engine has flushed it to the wire
    pub fn disconnect_sent(&mut self) {
        if let Some(sender) = self.disconnect.take() {
            let _ = sender.send(Ok(()));
        }
    }

    /// Fail every pending operation because the connection is gone
    pub fn fail_all(&mut self, reason: &str) {
        if let Some(sender) = self.connect.take() {
            let _ = sender.send(Err(AckError::ConnectionClosed(reason.to_string())));
        }
        for pending in self.publishes.drain(..) {
            let _ = pending
                .done
                .send(Err(AckError::ConnectionClosed(reason.to_string())));
        }
        for pending in self.subscribes.drain(..) {
            let _ = pending
                .done
                .send(Err(AckError::ConnectionClosed(reason.to_string())));
        }
        if let Some(sender) = self.disconnect.take() {
            let _ = sender.send(Err(AckError::ConnectionClosed(reason.to_string())));
        }
    }

    /// Number of operations still waiting for an acknowledgment
    pub fn pending_count(&self) -> usize {
        self.publishes.len()
            + self.subscribes.len()
            + usize::from(self.connect.is_some())
            + usize::from(self.disconnect.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_resolves_after_send_and_ack() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_publish();

        registry.publish_sent(7);
        registry.publish_acked(7);

        let delivered = token.wait().await.expect("should resolve");
        assert_eq!(delivered, 7);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_publishes_resolve_in_fifo_order() {
        let mut registry = AckRegistry::new();
        let first = registry.expect_publish();
        let second = registry.expect_publish();

        // The engine announces ids in submission order
        registry.publish_sent(1);
        registry.publish_sent(2);

        registry.publish_acked(2);
        assert_eq!(second.wait().await, Ok(2));
        assert_eq!(registry.pending_count(), 1);

        registry.publish_acked(1);
        assert_eq!(first.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn test_ack_for_unknown_packet_id_is_ignored() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_publish();
        registry.publish_sent(3);

        registry.publish_acked(99);
        assert_eq!(registry.pending_count(), 1);

        registry.publish_acked(3);
        assert_eq!(token.wait().await, Ok(3));
    }

    #[tokio::test]
    async fn test_wait_on_already_resolved_token_returns_immediately() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_connect();
        registry.connect_acked(ConnectAck {
            session_present: true,
        });

        let ack = token.wait().await.expect("already resolved");
        assert!(ack.session_present);
    }

    #[tokio::test]
    async fn test_connect_rejection_reports_reason() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_connect();
        registry.connect_rejected("BadUserNamePassword".to_string());

        let err = token.wait().await.unwrap_err();
        assert!(matches!(err, AckError::Rejected(ref reason) if reason.contains("BadUserNamePassword")));
    }

    #[tokio::test]
    async fn test_subscribe_rejection_reports_reason() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_subscribe();
        registry.subscribe_sent(4);
        registry.subscribe_acked(4, Err("broker returned failure code".to_string()));

        let err = token.wait().await.unwrap_err();
        assert!(matches!(err, AckError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_pending_operation() {
        let mut registry = AckRegistry::new();
        let connect = registry.expect_connect();
        let publish = registry.expect_publish();
        let disconnect = registry.expect_disconnect();

        registry.fail_all("connection reset");
        assert_eq!(registry.pending_count(), 0);

        assert!(matches!(
            connect.wait().await,
            Err(AckError::ConnectionClosed(_))
        ));
        assert!(matches!(
            publish.wait().await,
            Err(AckError::ConnectionClosed(_))
        ));
        assert!(matches!(
            disconnect.wait().await,
            Err(AckError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_abandoned_publish_never_claims_a_packet_id() {
        let mut registry = AckRegistry::new();
        let kept = registry.expect_publish();
        let _withdrawn = registry.expect_publish();
        registry.abandon_publish();

        registry.publish_sent(1);
        registry.publish_acked(1);

        assert_eq!(kept.wait().await, Ok(1));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_registry_resolves_as_engine_stopped() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_publish();
        drop(registry);

        assert_eq!(token.wait().await, Err(AckError::EngineStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_expires() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_disconnect();

        let result = token.wait_timeout(Duration::from_secs(5)).await;
        assert_eq!(result, Err(AckError::TimedOut(Duration::from_secs(5))));
        // The registry entry survives; only the waiter gave up
        assert_eq!(registry.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_resolves_when_flushed() {
        let mut registry = AckRegistry::new();
        let token = registry.expect_disconnect();
        registry.disconnect_sent();

        assert_eq!(token.wait().await, Ok(()));
    }
}
