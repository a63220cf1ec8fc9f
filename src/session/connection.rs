//! Pure session state management
//!
//! Lifecycle state machine, operation gating, and protocol engine option
//! assembly. Everything here is a pure function over the configuration and
//! the current state, so it is tested without a broker.

use std::time::Duration;

use rumqttc::{MqttOptions, Transport};
use thiserror::Error;

use crate::config::ConnectionConfig;
use crate::session::token::AckError;

/// Lifecycle state of the single broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; the initial state, and where a broker-initiated
    /// disconnect lands while shutdown has not been requested
    Disconnected,
    /// Handshake sent, waiting for the broker's acknowledgment
    Connecting,
    /// Handshake acknowledged; publish and subscribe are permitted
    Connected,
    /// Disconnect requested, waiting for the engine to flush it
    Disconnecting,
    /// Terminal: the underlying handle has been released
    Closed,
}

/// Next state after the connection to the broker is lost
///
/// A loss during shutdown keeps the session in `Disconnecting`; the
/// coordinator still owns the remaining teardown, and close is what reaches
/// the terminal state.
pub fn state_after_connection_loss(state: SessionState) -> SessionState {
    match state {
        SessionState::Disconnecting => SessionState::Disconnecting,
        SessionState::Closed => SessionState::Closed,
        _ => SessionState::Disconnected,
    }
}

/// Whether a publish or subscribe may be issued in this state
pub fn can_operate(state: SessionState) -> bool {
    state == SessionState::Connected
}

/// Whether a disconnect request is meaningful in this state
///
/// Disconnecting from `Disconnected` or `Closed` is a no-op, not an error.
pub fn can_disconnect(state: SessionState) -> bool {
    matches!(state, SessionState::Connected | SessionState::Connecting)
}

/// Why a connect attempt failed; always fatal to the run
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The broker refused the handshake (credentials, client id rules)
    #[error("Broker rejected the handshake: {0}")]
    Rejected(String),
    /// Transport-level failure: TLS negotiation, unreachable broker, reset
    #[error("Connection failed: {0}")]
    Network(String),
    /// The connect request could not be handed to the engine at all
    #[error("Connect request failed: {0}")]
    Request(String),
}

impl From<AckError> for ConnectError {
    fn from(err: AckError) -> Self {
        match err {
            AckError::Rejected(reason) => ConnectError::Rejected(reason),
            AckError::ConnectionClosed(reason) => ConnectError::Network(reason),
            AckError::EngineStopped => {
                ConnectError::Network("protocol engine stopped before the handshake".to_string())
            }
            AckError::TimedOut(limit) => {
                ConnectError::Network(format!("handshake timed out after {limit:?}"))
            }
        }
    }
}

/// Why a publish, subscribe, or disconnect call failed
///
/// Operation errors are reported and the run continues; only the caller
/// decides whether one is fatal.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: SessionState },
    #[error("Request rejected by the engine: {0}")]
    Request(String),
    #[error("Acknowledgment failed: {0}")]
    Ack(#[from] AckError),
}

/// Assemble the engine options for one session
///
/// The transport capability comes from the credential provider; everything
/// else derives from the immutable configuration. The clean-session flag is
/// passed straight through to the handshake: true makes the broker discard
/// subscription state and queued messages held for this client identifier,
/// false restores them.
pub fn configure_session_options(config: &ConnectionConfig, transport: Transport) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
    options.set_credentials(&config.username, &config.password);
    options.set_clean_session(config.clean_session);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_transport(transport);
    options
}
