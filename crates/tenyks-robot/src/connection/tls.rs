//! TLS client setup for connections with `ssl = true`.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use super::ConnectionError;

/// Build a connector trusting the bundled web PKI roots.
pub fn connector() -> Result<TlsConnector, ConnectionError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectionError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Server name used for certificate verification.
pub fn server_name(host: &str) -> Result<ServerName<'static>, ConnectionError> {
    ServerName::try_from(host.to_string())
        .map_err(|e| ConnectionError::Tls(format!("invalid server name {host}: {e}")))
}
