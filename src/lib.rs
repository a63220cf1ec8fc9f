//! mqttrun - mutual-TLS MQTT publish/subscribe runner
//!
//! A single-session MQTT client that authenticates over mutual TLS with a
//! PKCS#12 client certificate, publishes a numbered message on a fixed
//! interval, optionally subscribes to the same topic, and mirrors
//! everything the broker reports into structured logs.
//!
//! # Overview
//!
//! This crate provides:
//! - Immutable connection configuration with validation
//! - Credential loading: PKCS#12 bundle to TLS transport
//! - A managed broker session with completion tokens for every
//!   acknowledgment and no automatic reconnection
//! - A periodic publisher and a one-shot subscriber
//! - Cooperative shutdown wired to SIGINT and SIGTERM
//!
//! # Quick Start
//!
//! ```rust
//! use std::path::PathBuf;
//! use mqttrun::config::ConnectionConfig;
//!
//! let config = ConnectionConfig {
//!     broker: "broker.example.com".to_string(),
//!     port: 8883,
//!     client_id: "sensor-17".to_string(),
//!     username: "sensor".to_string(),
//!     password: String::new(),
//!     topic: "plant/line4/telemetry".to_string(),
//!     clean_session: false,
//!     cert_bundle: PathBuf::from("certs/sensor-17.p12"),
//!     cert_passphrase: "changeit".to_string(),
//!     publish: true,
//!     subscribe: false,
//!     message: "Hello MQTT from Rust!".to_string(),
//!     keep_alive_secs: 60,
//! };
//!
//! config.validate().expect("configuration is complete");
//! assert_eq!(config.server_uri(), "mqtts://broker.example.com:8883");
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod observability;
pub mod publisher;
pub mod session;
pub mod shutdown;
pub mod subscriber;
pub mod testing;

pub use config::ConnectionConfig;
pub use error::{RunError, RunResult};
pub use session::{
    Channel, EventDispatcher, Message, Session, SessionEvent, SessionHandle, SessionManager,
    SessionState,
};
pub use shutdown::{wait_for_termination, ShutdownSignal};
