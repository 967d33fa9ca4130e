//! gNMI gateway
//!
//! Serves gNMI Capabilities, Get, Set and Subscribe over a configured datastore.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use gnmi_gateway::{DatastoreRegistry, GatewayConfig, GatewayServer, GnmiService};
use gnmi_gateway_common::{init_tracing, load_config};

/// gNMI gateway over a path-addressed datastore
#[derive(Parser, Debug)]
#[command(name = "gnmi-gateway")]
#[command(about = "Serve gNMI get/set/subscribe over a path-addressed datastore")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/gateway.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Override listen address
    #[arg(long)]
    address: Option<String>,

    /// Override listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the datastore instance to serve
    #[arg(long)]
    datastore: Option<String>,

    /// Server certificate (PEM); enables TLS together with --tls-key
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<String>,

    /// Server private key (PEM)
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<String>,

    /// CA certificate used to verify clients (PEM)
    #[arg(long)]
    tls_ca: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(address) = &self.address {
            config.server.address = address.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(datastore) = &self.datastore {
            config.gateway.datastore = datastore.clone();
        }
        if let (Some(cert), Some(key)) = (&self.tls_cert, &self.tls_key) {
            config.server.tls.enabled = true;
            config.server.tls.cert = Some(cert.clone());
            config.server.tls.key = Some(key.clone());
        }
        if let Some(ca) = &self.tls_ca {
            config.server.tls.ca_cert = Some(ca.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration, then let the command line win
    let mut config: GatewayConfig = load_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    // Initialize logging
    let logging = config.logging.with_level_override(args.log_level.as_deref());
    init_tracing(&logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        datastore = %config.gateway.datastore,
        "Starting gNMI gateway"
    );

    let registry = DatastoreRegistry::from_config(&config.datastores);
    let service = GnmiService::from_registry(&registry, config.gateway.clone())?;
    let server = GatewayServer::from_config(&config, service)?;

    server.run().await?;

    info!("gNMI gateway stopped");
    Ok(())
}
