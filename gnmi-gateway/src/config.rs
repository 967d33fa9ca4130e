//! Gateway configuration

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gnmi_gateway_common::{LoggingConfig, load_config};

use crate::datastore::SchemaModule;
use crate::error::{GatewayError, Result};

/// Top-level configuration for the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// gRPC listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Request handling settings
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Datastore instances by name
    #[serde(default)]
    pub datastores: BTreeMap<String, DatastoreConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// gRPC listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_address")]
    pub address: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// TLS configuration
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            tls: TlsConfig::default(),
        }
    }
}

/// TLS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Enable TLS
    #[serde(default)]
    pub enabled: bool,

    /// Path to server certificate file (PEM)
    #[serde(default)]
    pub cert: Option<String>,

    /// Path to server private key file (PEM)
    #[serde(default)]
    pub key: Option<String>,

    /// Path to CA certificate used to verify clients (PEM)
    #[serde(default)]
    pub ca_cert: Option<String>,
}

/// Request handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Datastore instance requests are served from
    #[serde(default = "default_datastore")]
    pub datastore: String,

    /// Deadline for Capabilities, Get and Set in milliseconds (0 disables)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Notifications buffered per Subscribe stream
    #[serde(default = "default_subscribe_buffer")]
    pub subscribe_buffer: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            datastore: default_datastore(),
            request_timeout_ms: default_request_timeout(),
            subscribe_buffer: default_subscribe_buffer(),
        }
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

/// An in-memory datastore instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Schema modules reported by Capabilities
    #[serde(default)]
    pub modules: Vec<SchemaModule>,

    /// Initial data, keyed by store-dialect path
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9339
}

fn default_datastore() -> String {
    "running".to_string()
}

fn default_request_timeout() -> u64 {
    30000 // 30 seconds
}

fn default_subscribe_buffer() -> usize {
    128
}

impl GatewayConfig {
    /// Load configuration from a JSON5 file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if self.server.port == 0 {
            return Err(GatewayError::config("server.port must be non-zero"));
        }

        if self.gateway.subscribe_buffer == 0 {
            return Err(GatewayError::config(
                "gateway.subscribe_buffer must be at least 1",
            ));
        }

        if !self.datastores.contains_key(&self.gateway.datastore) {
            return Err(GatewayError::config(format!(
                "gateway.datastore '{}' is not defined in datastores",
                self.gateway.datastore
            )));
        }

        let tls = &self.server.tls;
        if tls.enabled {
            for (field, value) in [("cert", &tls.cert), ("key", &tls.key)] {
                match value {
                    Some(path) if Path::new(path).exists() => {}
                    Some(path) => {
                        return Err(GatewayError::config(format!(
                            "server.tls.{} file not found: {}",
                            field, path
                        )));
                    }
                    None => {
                        return Err(GatewayError::config(format!(
                            "server.tls.{} is required when TLS is enabled",
                            field
                        )));
                    }
                }
            }
            if let Some(ca) = &tls.ca_cert {
                if !Path::new(ca).exists() {
                    return Err(GatewayError::config(format!(
                        "server.tls.ca_cert file not found: {}",
                        ca
                    )));
                }
            }
        }

        Ok(())
    }

    /// Socket address to listen on
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.server.address.parse().map_err(|e| {
            GatewayError::config(format!(
                "Invalid server.address '{}': {}",
                self.server.address, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}
