//! TLS acceptor for secure-mode listeners

use baton_config::TlsConfig;
use baton_core::{Error, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::ServerConfig;
use rustls::SupportedProtocolVersion;
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tracing::info;

static TLS12_AND_UP: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS12, &rustls::version::TLS13];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// TLS connection acceptor
#[derive(Clone)]
pub struct TlsAcceptor {
    inner: tokio_rustls::TlsAcceptor,
}

impl std::fmt::Debug for TlsAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsAcceptor").finish_non_exhaustive()
    }
}

impl TlsAcceptor {
    /// Create an acceptor from PEM certificate and key files
    pub fn new(config: &TlsConfig) -> Result<Self> {
        let versions = match config.min_tls_version.as_str() {
            "1.2" => TLS12_AND_UP,
            "1.3" => TLS13_ONLY,
            other => {
                return Err(Error::Tls(format!(
                    "Unsupported minimum TLS version: {other}"
                )))
            }
        };

        let certs = load_certificates(&config.cert_file)?;
        let key = load_private_key(&config.key_file)?;

        let mut server_config = ServerConfig::builder_with_protocol_versions(versions)
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Tls(format!("Failed to build TLS config: {e}")))?;
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        info!(
            cert_file = %config.cert_file.display(),
            min_tls = %config.min_tls_version,
            "TLS acceptor initialized"
        );

        Ok(Self {
            inner: tokio_rustls::TlsAcceptor::from(Arc::new(server_config)),
        })
    }

    /// Perform the server side of a TLS handshake
    pub async fn accept<IO>(&self, stream: IO) -> Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        self.inner
            .accept(stream)
            .await
            .map_err(|e| Error::Tls(format!("TLS handshake failed: {e}")))
    }
}

/// Load certificates from a PEM file
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        Error::Tls(format!(
            "Failed to open certificate file {}: {e}",
            path.display()
        ))
    })?;

    let certs = certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Load the first private key from a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        Error::Tls(format!(
            "Failed to open private key file {}: {e}",
            path.display()
        ))
    })?;

    private_key(&mut BufReader::new(file))
        .map_err(|e| Error::Tls(format!("Failed to parse private key: {e}")))?
        .ok_or_else(|| Error::Tls(format!("No private key found in {}", path.display())))
}
