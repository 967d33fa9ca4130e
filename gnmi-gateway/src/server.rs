//! gRPC server lifecycle.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::signal;
use tokio_stream::Stream;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tracing::{error, info};

use crate::config::{GatewayConfig, TlsConfig};
use crate::error::{GatewayError, Result};
use crate::gnmi::g_nmi_server::GNmiServer;
use crate::handler::GnmiService;

/// Serves the gNMI service until shutdown.
///
/// Handles:
/// - Optional server TLS with client certificate verification
/// - Graceful shutdown on Ctrl+C
/// - Serving on a caller-provided listener (used by tests)
pub struct GatewayServer {
    addr: SocketAddr,
    service: GnmiService,
    tls: Option<ServerTlsConfig>,
}

impl GatewayServer {
    pub fn new(addr: SocketAddr, service: GnmiService) -> Self {
        Self {
            addr,
            service,
            tls: None,
        }
    }

    /// Create a server from validated configuration, loading TLS material if enabled.
    pub fn from_config(config: &GatewayConfig, service: GnmiService) -> Result<Self> {
        let server = Self::new(config.listen_addr()?, service);
        match load_tls(&config.server.tls)? {
            Some(tls) => Ok(server.with_tls(tls)),
            None => Ok(server),
        }
    }

    pub fn with_tls(mut self, tls: ServerTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn builder(&mut self) -> Result<Server> {
        let builder = Server::builder();
        match self.tls.take() {
            Some(tls) => builder
                .tls_config(tls)
                .map_err(|e| GatewayError::Tls(e.to_string())),
            None => Ok(builder),
        }
    }

    /// Run until Ctrl+C is received.
    pub async fn run(mut self) -> Result<()> {
        let tls = self.tls.is_some();
        let mut builder = self.builder()?;

        info!(addr = %self.addr, tls, "gNMI server listening. Press Ctrl+C to stop.");

        builder
            .add_service(GNmiServer::new(self.service))
            .serve_with_shutdown(self.addr, shutdown_signal())
            .await?;

        info!("gNMI server stopped");
        Ok(())
    }

    /// Serve connections from `incoming` until `shutdown` resolves.
    pub async fn serve_with_incoming<I, F>(mut self, incoming: I, shutdown: F) -> Result<()>
    where
        I: Stream<Item = std::io::Result<TcpStream>> + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        let mut builder = self.builder()?;

        builder
            .add_service(GNmiServer::new(self.service))
            .serve_with_incoming_shutdown(incoming, shutdown)
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        // Without a signal handler, keep serving until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

/// Build the server TLS configuration, or `None` when TLS is disabled.
///
/// The PEM files are parsed up front so that a bad certificate or key is
/// reported at startup rather than on the first handshake.
pub fn load_tls(config: &TlsConfig) -> Result<Option<ServerTlsConfig>> {
    if !config.enabled {
        return Ok(None);
    }

    let (Some(cert_path), Some(key_path)) = (&config.cert, &config.key) else {
        return Err(GatewayError::config(
            "TLS is enabled but server.tls.cert or server.tls.key is missing",
        ));
    };

    let cert = std::fs::read(cert_path)?;
    let key = std::fs::read(key_path)?;
    check_certificates(&cert, cert_path)?;
    check_private_key(&key, key_path)?;

    let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    if let Some(ca_path) = &config.ca_cert {
        let ca = std::fs::read(ca_path)?;
        check_certificates(&ca, ca_path)?;
        tls = tls.client_ca_root(Certificate::from_pem(ca));
        info!(ca = %ca_path, "Client certificate verification enabled");
    }

    info!(cert = %cert_path, "Loaded server TLS identity");
    Ok(Some(tls))
}

fn check_certificates(pem: &[u8], path: &str) -> Result<()> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Tls(format!("{}: {}", path, e)))?;

    if certs.is_empty() {
        return Err(GatewayError::Tls(format!("{}: no certificates found", path)));
    }
    Ok(())
}

fn check_private_key(pem: &[u8], path: &str) -> Result<()> {
    match rustls_pemfile::private_key(&mut &pem[..]) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(GatewayError::Tls(format!("{}: no private key found", path))),
        Err(e) => Err(GatewayError::Tls(format!("{}: {}", path, e))),
    }
}
