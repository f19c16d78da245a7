//! Dialling a provider: socket setup, optional TLS, greeting

use crate::config::ProviderConfig;
use crate::error::{NntpError, Result};
use crate::response::codes;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{self, CryptoProvider, ring};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use super::{AsyncStream, ConnectionState, NntpClient};

/// Read buffer; a default 750 KB part arrives in a handful of fills
const READ_BUFFER: usize = 256 * 1024;

/// Kernel buffer sizes requested for the socket; refusal is only logged
const SO_RCVBUF: usize = 4 * 1024 * 1024;
const SO_SNDBUF: usize = 1024 * 1024;

/// Verifier for `allow_insecure_tls` providers
///
/// Accepts any certificate chain and name but still checks that the
/// handshake was signed by the presented key.
#[derive(Debug)]
struct SkipChainValidation {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for SkipChainValidation {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// rustls client settings on the ring provider, webpki roots unless the
/// provider opted out of chain validation
fn tls_config(allow_insecure: bool) -> Result<ClientConfig> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| NntpError::Tls(e.to_string()))?;

    let config = if allow_insecure {
        warn!("Certificate validation disabled for this provider");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipChainValidation { provider }))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(config)
}

fn resolve(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{host} did not resolve"),
        )
    })
}

/// Blocking resolve and connect with socket options applied first
fn dial(host: &str, port: u16) -> std::io::Result<std::net::TcpStream> {
    use socket2::{Domain, Protocol, Socket, Type};

    let addr = resolve(host, port)?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    for (what, applied) in [
        ("receive", socket.set_recv_buffer_size(SO_RCVBUF)),
        ("send", socket.set_send_buffer_size(SO_SNDBUF)),
    ] {
        if let Err(e) = applied {
            debug!("{}:{} kept default {} buffer: {}", host, port, what, e);
        }
    }

    socket.connect(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// TCP (and TLS when configured), bounded by the connect timeout
async fn open_stream(config: &ProviderConfig) -> Result<Box<dyn AsyncStream>> {
    let (host, port) = (config.host.clone(), config.port);
    let socket = timeout(
        config.connect_timeout(),
        tokio::task::spawn_blocking(move || dial(&host, port)),
    )
    .await
    .map_err(|_| NntpError::Timeout)?
    .map_err(|e| NntpError::Io(std::io::Error::other(e)))??;
    let tcp = TcpStream::from_std(socket)?;

    if !config.tls {
        return Ok(Box::new(tcp));
    }

    let name = ServerName::try_from(config.host.clone())
        .map_err(|e| NntpError::Tls(format!("{}: {e}", config.host)))?;
    let connector = TlsConnector::from(Arc::new(tls_config(config.allow_insecure_tls)?));
    let tls = timeout(config.connect_timeout(), connector.connect(name, tcp))
        .await
        .map_err(|_| NntpError::Timeout)?
        .map_err(|e| NntpError::Tls(format!("handshake with {}: {e}", config.host)))?;
    Ok(Box::new(tls))
}

impl NntpClient {
    /// Open a session to the provider and read its greeting
    ///
    /// Authentication is a separate step; see
    /// [`authenticate`](Self::authenticate).
    ///
    /// # Errors
    ///
    /// [`NntpError::Io`] or [`NntpError::Tls`] when the transport cannot
    /// be set up, [`NntpError::Timeout`] past `connect_timeout`, and
    /// [`NntpError::Protocol`] for a greeting other than 200/201.
    pub async fn connect(config: Arc<ProviderConfig>) -> Result<Self> {
        debug!("Dialling {} (tls={})", config.label(), config.tls);
        let stream = open_stream(&config).await?;
        Self::handshake(stream, config).await
    }

    /// Wrap an established stream and read the greeting
    pub(crate) async fn handshake(
        stream: Box<dyn AsyncStream>,
        config: Arc<ProviderConfig>,
    ) -> Result<Self> {
        let mut client = Self {
            stream: BufReader::with_capacity(READ_BUFFER, stream),
            state: ConnectionState::Ready,
            provider: config,
            current_group: None,
            headers_compressed: false,
            posting_allowed: true,
            wire_bytes: 0,
            inflated_bytes: 0,
            broken: false,
        };

        let greeting = client.read_response().await?;
        match greeting.code {
            codes::READY_POSTING_ALLOWED => {}
            codes::READY_NO_POSTING => {
                debug!("{} is read-only: {}", client.provider.label(), greeting.message);
                client.posting_allowed = false;
            }
            code => {
                return Err(NntpError::Protocol {
                    code,
                    message: greeting.message,
                });
            }
        }
        Ok(client)
    }
}
