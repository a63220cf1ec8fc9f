//! Connection configuration for the session runner
//!
//! A `ConnectionConfig` is built once at startup from the CLI surface,
//! validated before any network activity, and never mutated afterwards.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Default broker port for MQTT over TLS
pub const DEFAULT_PORT: u16 = 8883;

/// Default payload text; the publish counter is appended per message
pub const DEFAULT_MESSAGE: &str = "Hello MQTT from Rust!";

/// Default keep-alive interval handed to the protocol engine, in seconds
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Immutable description of one broker session
///
/// Authentication is layered: `username`/`password` travel in the protocol
/// handshake while the certificate bundle authenticates the TLS transport.
/// Both layers are always presented together.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Broker hostname, without scheme or port
    pub broker: String,
    /// Broker TLS port
    pub port: u16,
    /// Client identifier presented on the handshake (must be non-empty and
    /// unique enough to avoid broker-side session collisions)
    pub client_id: String,
    /// Username for protocol-level authentication
    pub username: String,
    /// Password for protocol-level authentication; may be empty
    pub password: String,
    /// Topic used by both the publish loop and the subscriber
    pub topic: String,
    /// When true the broker discards subscription state and queued messages
    /// held for this client identifier; when false they survive reconnects
    pub clean_session: bool,
    /// Path to the PKCS#12 bundle holding the client certificate and key
    pub cert_bundle: PathBuf,
    /// Passphrase protecting the bundle; an empty value is allowed for
    /// bundles exported without a password
    pub cert_passphrase: String,
    /// Run the periodic publish loop
    pub publish: bool,
    /// Issue the one-shot subscribe
    pub subscribe: bool,
    /// Payload text; the running counter is appended as ` #<n>`
    pub message: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    MissingOption(&'static str),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConnectionConfig {
    /// Validate the invariants that must hold before a connect attempt
    ///
    /// Violations are configuration errors surfaced to the operator before
    /// any network activity, never runtime errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.trim().is_empty() {
            return Err(ConfigError::MissingOption("broker"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingOption("client-id"));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingOption("username"));
        }
        if self.topic.trim().is_empty() {
            return Err(ConfigError::MissingOption("topic"));
        }
        if self.cert_bundle.as_os_str().is_empty() {
            return Err(ConfigError::MissingOption("cert-bundle"));
        }
        if !self.publish && !self.subscribe {
            return Err(ConfigError::InvalidConfig(
                "at least one of --publish or --subscribe must be enabled".to_string(),
            ));
        }
        // The protocol engine refuses keep-alive intervals under 5 seconds
        if self.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(format!(
                "keep-alive must be at least 5 seconds, got {}",
                self.keep_alive_secs
            )));
        }
        Ok(())
    }

    /// Connection target rendered with the encrypted-transport scheme
    pub fn server_uri(&self) -> String {
        format!("mqtts://{}:{}", self.broker, self.port)
    }

    /// Generate a client identifier unique enough for broker-side sessions
    pub fn generated_client_id() -> String {
        format!("mqttrun-{}", Uuid::new_v4().simple())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            broker: "test.local".to_string(),
            port: DEFAULT_PORT,
            client_id: "c1".to_string(),
            username: "u".to_string(),
            password: String::new(),
            topic: "t/1".to_string(),
            clean_session: false,
            cert_bundle: PathBuf::from("client.pfx"),
            cert_passphrase: "secret".to_string(),
            publish: true,
            subscribe: false,
            message: "hi".to_string(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}
