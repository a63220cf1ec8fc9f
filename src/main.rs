//! mqttrun - Main Entry Point
//!
//! Wires configuration, credentials, the broker session, and the workers
//! together, and owns the shutdown sequence: stop flag, bounded disconnect,
//! publisher join, close, dispatcher drain.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use mqttrun::config::{ConnectionConfig, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_MESSAGE, DEFAULT_PORT};
use mqttrun::observability::init_default_logging;
use mqttrun::session::{EventDispatcher, SessionManager};
use mqttrun::shutdown::{wait_for_termination, ShutdownSignal};
use mqttrun::{credentials, publisher, subscriber, RunResult};

/// Publish and subscribe to an MQTT broker over mutual TLS
#[derive(Parser)]
#[command(name = "mqttrun")]
#[command(about = "Publish and subscribe to an MQTT broker over mutual TLS")]
#[command(version)]
struct Cli {
    /// Broker hostname to connect to
    #[arg(long, env = "MQTT_BROKER")]
    broker: String,

    /// Broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Client identifier; generated when omitted
    #[arg(long, env = "MQTT_CLIENT_ID")]
    client_id: Option<String>,

    /// Username presented during the handshake
    #[arg(long, env = "MQTT_USERNAME")]
    username: String,

    /// Password presented during the handshake; may be empty
    #[arg(long, env = "MQTT_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Topic to publish to and/or subscribe on
    #[arg(long, env = "MQTT_TOPIC")]
    topic: String,

    /// Start a clean session instead of resuming the persistent one
    #[arg(long)]
    clean_session: bool,

    /// Path to the PKCS#12 client certificate bundle
    #[arg(long, env = "MQTT_CERT_BUNDLE", value_name = "FILE")]
    cert_bundle: PathBuf,

    /// Passphrase protecting the certificate bundle; may be empty
    #[arg(long, env = "MQTT_CERT_PASSPHRASE", hide_env_values = true)]
    cert_passphrase: String,

    /// Publish a numbered message every two seconds
    #[arg(long)]
    publish: bool,

    /// Subscribe to the topic and log arriving messages
    #[arg(long)]
    subscribe: bool,

    /// Message text; the sequence number is appended to each publish
    #[arg(long, env = "MQTT_MESSAGE", default_value = DEFAULT_MESSAGE)]
    message: String,

    /// Keep-alive interval in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_KEEP_ALIVE_SECS)]
    keep_alive: u64,
}

impl Cli {
    fn into_config(self) -> ConnectionConfig {
        ConnectionConfig {
            broker: self.broker,
            port: self.port,
            client_id: self
                .client_id
                .unwrap_or_else(ConnectionConfig::generated_client_id),
            username: self.username,
            password: self.password,
            topic: self.topic,
            clean_session: self.clean_session,
            cert_bundle: self.cert_bundle,
            cert_passphrase: self.cert_passphrase,
            publish: self.publish,
            subscribe: self.subscribe,
            message: self.message,
            keep_alive_secs: self.keep_alive,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting mqttrun v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.into_config();
    if let Err(error) = run(config).await {
        error!("Run failed: {error}");
        process::exit(error.exit_code());
    }

    info!("Shutdown complete");
}

async fn run(config: ConnectionConfig) -> RunResult<()> {
    // Configuration and credential failures abort before any network activity
    config.validate()?;
    let transport = credentials::load_transport(&config.cert_bundle, &config.cert_passphrase)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let dispatcher = EventDispatcher::spawn(events_rx);

    info!(
        server_uri = %config.server_uri(),
        client_id = %config.client_id,
        clean_session = config.clean_session,
        "Connecting to broker"
    );
    let mut session = SessionManager::new(&config, transport).connect(events_tx).await?;

    if config.subscribe {
        if let Err(error) = subscriber::subscribe_once(&session.handle(), &config.topic).await {
            error!(error = %error, "Subscription failed, continuing without it");
        }
    }

    let shutdown = ShutdownSignal::new();
    let publisher_task = config.publish.then(|| {
        tokio::spawn(publisher::run_publisher(
            session.handle(),
            config.topic.clone(),
            config.message.clone(),
            shutdown.clone(),
        ))
    });

    wait_for_termination().await?;

    // Stop flag first, so the publisher exits at its next iteration check;
    // an in-flight delivery wait still runs to resolution.
    shutdown.trigger();

    if let Err(error) = session.disconnect().await {
        warn!(error = %error, "Disconnect did not complete cleanly");
    }

    if let Some(task) = publisher_task {
        match task.await {
            Ok(delivered) => info!(delivered, "Publisher finished"),
            Err(error) => warn!(error = %error, "Publisher task failed"),
        }
    }

    session.close().await;
    dispatcher.join().await;
    Ok(())
}
