//! Client credential loading for mutual TLS
//!
//! Turns a PKCS#12 certificate bundle and passphrase into the encrypted
//! transport capability the protocol engine consumes. The broker certificate
//! is validated against the platform trust roots; the bundle only supplies
//! the client-side identity.

use std::path::Path;

use native_tls::{Identity, TlsConnector};
use rumqttc::{TlsConfiguration, Transport};
use thiserror::Error;

/// Credential loading errors; all of these are fatal and surface before a
/// connect is attempted
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read certificate bundle '{path}': {source}")]
    BundleRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load client identity from '{path}': {source}")]
    IdentityParse {
        path: String,
        #[source]
        source: native_tls::Error,
    },
    #[error("Failed to build TLS connector: {0}")]
    ConnectorBuild(#[source] native_tls::Error),
}

/// Build the mutual-TLS transport from a PKCS#12 bundle
///
/// A wrong passphrase and a corrupt bundle are indistinguishable to the
/// parser; both surface as an identity error naming the bundle path.
pub fn load_transport(bundle: &Path, passphrase: &str) -> Result<Transport, CredentialError> {
    let der = std::fs::read(bundle).map_err(|e| CredentialError::BundleRead {
        path: bundle.display().to_string(),
        source: e,
    })?;

    let identity =
        Identity::from_pkcs12(&der, passphrase).map_err(|e| CredentialError::IdentityParse {
            path: bundle.display().to_string(),
            source: e,
        })?;

    let connector = TlsConnector::builder()
        .identity(identity)
        .build()
        .map_err(CredentialError::ConnectorBuild)?;

    Ok(Transport::tls_with_config(TlsConfiguration::Native(
        connector,
    )))
}
