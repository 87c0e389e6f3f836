use crate::endpoint::split_host_port;
use crate::error::{EksDetectorError, Result};
use crate::kubernetes::KubeConfig;
use opentelemetry::otel_debug;
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use rustls_pki_types::{CertificateDer, ServerName};
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// An established TLS session with the Kubernetes API server.
pub(crate) trait TlsConnection: Send {
    /// Peer certificate chain presented during the handshake, leaf first.
    fn peer_certificates(&self) -> &[CertificateDer<'static>];

    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Builds the client configuration used to reach the API server.
pub(crate) fn tls_config_for(config: &KubeConfig) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    if config.root_certificates.is_empty() {
        let native = rustls_native_certs::load_native_certs();
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        otel_debug!(
            name: "EksResourceDetector.SystemRootsLoaded",
            added = added as i64,
            ignored = ignored as i64,
            errors = native.errors.len() as i64
        );
    } else {
        roots.add_parsable_certificates(config.root_certificates.iter().cloned());
    }

    let tls_config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

    Ok(Arc::new(tls_config))
}

/// Connects to `address` and completes a TLS handshake on the blocking pool.
pub(crate) async fn dial(
    address: &str,
    tls_config: Arc<ClientConfig>,
) -> Result<Box<dyn TlsConnection>> {
    let dial_error = |source| EksDetectorError::Dial {
        address: address.to_string(),
        source,
    };

    let (host, _) = split_host_port(address);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|err| dial_error(io::Error::new(io::ErrorKind::InvalidInput, err)))?;

    let owned_address = address.to_string();
    let conn = tokio::task::spawn_blocking(move || {
        RustlsConnection::connect(&owned_address, server_name, tls_config)
    })
    .await
    .map_err(|err| dial_error(io::Error::other(err)))?
    .map_err(dial_error)?;

    Ok(Box::new(conn))
}

struct RustlsConnection {
    conn: ClientConnection,
    sock: TcpStream,
}

impl RustlsConnection {
    fn connect(
        address: &str,
        server_name: ServerName<'static>,
        tls_config: Arc<ClientConfig>,
    ) -> io::Result<Self> {
        let mut sock = connect_any(address)?;
        sock.set_read_timeout(Some(IO_TIMEOUT))?;
        sock.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut conn = ClientConnection::new(tls_config, server_name).map_err(io::Error::other)?;
        while conn.is_handshaking() {
            conn.complete_io(&mut sock)?;
        }

        Ok(RustlsConnection { conn, sock })
    }
}

/// Tries every resolved address in turn, keeping the last error.
fn connect_any(address: &str) -> io::Result<TcpStream> {
    let mut last_error = None;
    for socket_addr in address.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, IO_TIMEOUT) {
            Ok(sock) => return Ok(sock),
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
    }))
}

impl TlsConnection for RustlsConnection {
    fn peer_certificates(&self) -> &[CertificateDer<'static>] {
        self.conn.peer_certificates().unwrap_or_default()
    }

    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.conn.send_close_notify();
        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.sock)?;
        }
        self.sock.flush()?;
        self.sock.shutdown(Shutdown::Both)
    }
}

/// Collects the DNS subject alternative names of every certificate.
pub(crate) fn certificate_dns_names(certificates: &[CertificateDer<'_>]) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for der in certificates {
        let (_, certificate) = X509Certificate::from_der(der.as_ref())
            .map_err(|err| EksDetectorError::Certificate(err.to_string()))?;

        let Some(san) = certificate
            .subject_alternative_name()
            .map_err(|err| EksDetectorError::Certificate(err.to_string()))?
        else {
            continue;
        };

        names.extend(san.value.general_names.iter().filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        }));
    }

    Ok(names)
}
