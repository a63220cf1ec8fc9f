//! Session establishment, lifecycle ownership, and the engine driver
//!
//! `SessionManager` performs the handshake and hands back a `Session`, which
//! owns the driver task for the protocol engine. Workers publish and
//! subscribe through cloned `SessionHandle`s; lifecycle transitions
//! (disconnect, close) stay with the `Session` owner.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, EventLoop, MqttOptions, QoS, Transport};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::connection::{
    can_disconnect, can_operate, configure_session_options, state_after_connection_loss,
    ConnectError, OperationError, SessionState,
};
use super::events::{classify_event, EngineSignal, SessionEvent};
use super::token::{AckError, AckRegistry, CompletionToken, DeliveryToken};
use super::{Channel, Message};
use crate::config::ConnectionConfig;

/// Upper bound on the shutdown disconnect wait
///
/// The only bounded wait in the session: shutdown must not hang on a broker
/// that never flushes the disconnect. Steady-state acknowledgment waits are
/// unbounded.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long close waits for the driver to finish on its own before aborting
const ENGINE_JOIN_GRACE: Duration = Duration::from_millis(500);

/// Establishes one broker session from validated configuration
///
/// Consumed by `connect`; a new manager is built per connection attempt.
/// There is no automatic reconnection: when the session ends, for any
/// reason, the driver stops and the loss is reported rather than repaired.
pub struct SessionManager {
    options: MqttOptions,
    server_uri: String,
}

impl SessionManager {
    /// Assemble engine options from configuration and the TLS transport
    pub fn new(config: &ConnectionConfig, transport: Transport) -> Self {
        SessionManager {
            options: configure_session_options(config, transport),
            server_uri: config.server_uri(),
        }
    }

    /// Connect to the broker and wait for its handshake acknowledgment
    ///
    /// Spawns the driver task, then blocks until the broker accepts or
    /// refuses the handshake. Session events flow to `events` for the
    /// lifetime of the session; the channel closes when the driver stops.
    pub async fn connect(
        self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Session, ConnectError> {
        let (client, engine) = AsyncClient::new(self.options, 10);
        let registry = Arc::new(Mutex::new(AckRegistry::new()));
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        // Register interest in the handshake before the engine can emit it
        let token = registry.lock().await.expect_connect();

        let driver = tokio::spawn(drive_session(
            engine,
            Arc::clone(&registry),
            state_tx.clone(),
            events,
            self.server_uri.clone(),
        ));

        match token.wait().await {
            Ok(ack) => {
                info!(
                    server_uri = %self.server_uri,
                    session_present = ack.session_present,
                    "Session established"
                );
                Ok(Session {
                    client,
                    registry,
                    state_tx,
                    state_rx,
                    driver: Some(driver),
                    server_uri: self.server_uri,
                })
            }
            Err(error) => {
                driver.abort();
                Err(ConnectError::from(error))
            }
        }
    }
}

/// A live broker session and the owner of its driver task
///
/// Dropping a session without calling `close` aborts the driver; the
/// orderly path is disconnect, then close.
pub struct Session {
    client: AsyncClient,
    registry: Arc<Mutex<AckRegistry>>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    driver: Option<JoinHandle<()>>,
    server_uri: String,
}

impl Session {
    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// URI of the broker this session talks to
    pub fn server_uri(&self) -> &str {
        &self.server_uri
    }

    /// Cheap clonable handle for publish and subscribe
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            client: self.client.clone(),
            registry: Arc::clone(&self.registry),
            state: self.state_rx.clone(),
        }
    }

    /// Request an orderly disconnect and wait, bounded, for the engine to
    /// flush it
    ///
    /// A session that is already down is left alone; disconnecting twice is
    /// a no-op. Exceeding `DISCONNECT_TIMEOUT` returns an error so the
    /// caller can log it and proceed to `close`, which releases resources
    /// regardless.
    pub async fn disconnect(&mut self) -> Result<(), OperationError> {
        let current = self.state();
        if !can_disconnect(current) {
            debug!(state = ?current, "Disconnect requested but session is not up");
            return Ok(());
        }
        let _ = self.state_tx.send(SessionState::Disconnecting);

        let token = {
            let mut registry = self.registry.lock().await;
            let token = registry.expect_disconnect();
            if let Err(error) = self.client.disconnect().await {
                return Err(OperationError::Request(error.to_string()));
            }
            token
        };

        match token.wait_timeout(DISCONNECT_TIMEOUT).await {
            Ok(()) => {
                info!(server_uri = %self.server_uri, "Disconnected from broker");
                Ok(())
            }
            // The link dropping while we wait is still a finished disconnect
            Err(AckError::ConnectionClosed(reason)) | Err(AckError::Rejected(reason)) => {
                debug!(reason = %reason, "Connection ended while disconnect was in flight");
                Ok(())
            }
            Err(AckError::EngineStopped) => {
                debug!("Engine already stopped when disconnect was requested");
                Ok(())
            }
            Err(timed_out @ AckError::TimedOut(_)) => Err(OperationError::Ack(timed_out)),
        }
    }

    /// Release the session's resources
    ///
    /// Idempotent: the first call stops the driver and fails any pending
    /// acknowledgment waits; later calls return immediately.
    pub async fn close(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        let _ = self.state_tx.send(SessionState::Closed);

        match tokio::time::timeout(ENGINE_JOIN_GRACE, &mut driver).await {
            Ok(Ok(())) => debug!("Engine driver finished before close"),
            Ok(Err(error)) if !error.is_cancelled() => {
                warn!(error = %error, "Engine driver ended abnormally");
            }
            Ok(Err(_)) => {}
            Err(_) => {
                driver.abort();
                let _ = driver.await;
            }
        }

        // Nothing will resolve acknowledgments once the driver is gone
        self.registry.lock().await.fail_all("session closed");

        info!(server_uri = %self.server_uri, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Clonable capability to use (but not manage) the session
#[derive(Clone)]
pub struct SessionHandle {
    client: AsyncClient,
    registry: Arc<Mutex<AckRegistry>>,
    state: watch::Receiver<SessionState>,
}

#[async_trait::async_trait]
impl Channel for SessionHandle {
    async fn publish(&self, message: Message) -> Result<DeliveryToken, OperationError> {
        let current = *self.state.borrow();
        if !can_operate(current) {
            return Err(OperationError::NotConnected { state: current });
        }

        // Hold the registry lock across the send so registration order
        // matches the engine's request order; packet ids attach FIFO.
        let mut registry = self.registry.lock().await;
        let token = registry.expect_publish();
        if let Err(error) = self
            .client
            .publish(message.topic, message.qos, false, message.payload)
            .await
        {
            registry.abandon_publish();
            return Err(OperationError::Request(error.to_string()));
        }
        Ok(token)
    }

    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
    ) -> Result<CompletionToken<()>, OperationError> {
        let current = *self.state.borrow();
        if !can_operate(current) {
            return Err(OperationError::NotConnected { state: current });
        }

        let mut registry = self.registry.lock().await;
        let token = registry.expect_subscribe();
        if let Err(error) = self.client.subscribe(filter, qos).await {
            registry.abandon_subscribe();
            return Err(OperationError::Request(error.to_string()));
        }
        Ok(token)
    }
}

/// Poll the engine until the session ends
///
/// Exits on the first engine error or once the disconnect request reaches
/// the wire. The loop never re-polls after a failure; polling again would
/// make the engine retry the network connection, and this session ends
/// instead of reconnecting.
async fn drive_session(
    mut engine: EventLoop,
    registry: Arc<Mutex<AckRegistry>>,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    server_uri: String,
) {
    debug!(server_uri = %server_uri, "Engine driver started");
    loop {
        match engine.poll().await {
            Ok(event) => {
                let signal = classify_event(&event);
                if !process_engine_signal(signal, &registry, &state, &events, &server_uri).await {
                    break;
                }
            }
            Err(error) => {
                handle_engine_failure(&error, &registry, &state, &events).await;
                break;
            }
        }
    }
    debug!(server_uri = %server_uri, "Engine driver stopped");
}

/// Apply one classified engine signal; false stops the driver
async fn process_engine_signal(
    signal: EngineSignal,
    registry: &Arc<Mutex<AckRegistry>>,
    state: &watch::Sender<SessionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    server_uri: &str,
) -> bool {
    match signal {
        EngineSignal::HandshakeAcknowledged(ack) => {
            let _ = state.send(SessionState::Connected);
            registry.lock().await.connect_acked(ack);
            let _ = events.send(SessionEvent::ConnectComplete {
                session_present: ack.session_present,
                server_uri: server_uri.to_string(),
            });
            true
        }
        EngineSignal::HandshakeRejected { reason } => {
            warn!(reason = %reason, "Broker refused the handshake");
            let mut registry = registry.lock().await;
            registry.connect_rejected(reason);
            let _ = state.send(SessionState::Disconnected);
            false
        }
        EngineSignal::MessageReceived { topic, payload } => {
            let _ = events.send(SessionEvent::MessageArrived { topic, payload });
            true
        }
        EngineSignal::DeliveryAcknowledged { packet_id } => {
            registry.lock().await.publish_acked(packet_id);
            let _ = events.send(SessionEvent::DeliveryComplete {
                message_id: packet_id,
            });
            true
        }
        EngineSignal::SubscriptionConfirmed { packet_id, outcome } => {
            if let Err(ref reason) = outcome {
                let _ = events.send(SessionEvent::Error {
                    description: format!("subscribe rejected by the broker: {reason}"),
                });
            }
            registry.lock().await.subscribe_acked(packet_id, outcome);
            true
        }
        EngineSignal::PublishSent { packet_id } => {
            registry.lock().await.publish_sent(packet_id);
            true
        }
        EngineSignal::SubscribeSent { packet_id } => {
            registry.lock().await.subscribe_sent(packet_id);
            true
        }
        EngineSignal::DisconnectSent => {
            debug!("Disconnect request flushed to the wire");
            let mut registry = registry.lock().await;
            registry.disconnect_sent();
            registry.fail_all("session disconnected");
            let _ = state.send(SessionState::Disconnected);
            false
        }
        EngineSignal::Infrastructure => true,
    }
}

/// Handle a failed poll; the driver stops after this returns
///
/// A requested disconnect never reports the loss as an event; an
/// established connection dropping on its own does.
async fn handle_engine_failure(
    error: &ConnectionError,
    registry: &Arc<Mutex<AckRegistry>>,
    state: &watch::Sender<SessionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    let previous = *state.borrow();
    let description = error.to_string();

    {
        let mut registry = registry.lock().await;
        if let ConnectionError::ConnectionRefused(code) = error {
            registry.connect_rejected(format!("{code:?}"));
        }
        registry.fail_all(&description);
    }

    let _ = state.send(state_after_connection_loss(previous));

    match previous {
        SessionState::Connected => {
            error!(error = %description, "Connection to broker lost");
            let _ = events.send(SessionEvent::Disconnected {
                reason: description,
            });
        }
        SessionState::Disconnecting => {
            debug!(error = %description, "Link ended while disconnecting");
        }
        _ => {
            debug!(error = %description, "Connection attempt failed");
        }
    }
}
