//! Error types for the gateway.

use thiserror::Error;
use tonic::Status;

/// Result type alias using [`GatewayError`].
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while serving gNMI requests.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed path syntax or an unrecognized value case.
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Datastore session could not be opened or closed.
    #[error("Session error: {0}")]
    Session(String),

    /// Read, write, commit or subscribe failed in the datastore.
    #[error("Store operation failed: {0}")]
    StoreOperation(String),

    /// The request deadline passed before the datastore work finished.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// An event was sent before any receiver was registered.
    #[error("No event receiver registered")]
    NoReceiver,

    /// A value record was read through the wrong accessor.
    #[error("Value kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS material could not be loaded.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The gRPC transport failed to bind or serve.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Create a protocol decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::ProtocolDecode(msg.into())
    }

    /// Create a session error.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a store operation error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreOperation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<gnmi_gateway_common::Error> for GatewayError {
    fn from(err: gnmi_gateway_common::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<GatewayError> for Status {
    fn from(err: GatewayError) -> Self {
        match err {
            // Datastore failures abort the whole RPC with a single terminal status.
            GatewayError::Session(_) | GatewayError::StoreOperation(_) => {
                Status::cancelled(err.to_string())
            }
            GatewayError::ProtocolDecode(_) | GatewayError::KindMismatch { .. } => {
                Status::invalid_argument(err.to_string())
            }
            GatewayError::DeadlineExceeded(_) => Status::deadline_exceeded(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_store_failures_map_to_cancelled() {
        let status: Status = GatewayError::store("commit rejected").into();
        assert_eq!(status.code(), Code::Cancelled);
        assert!(status.message().contains("commit rejected"));

        let status: Status = GatewayError::session("no connection").into();
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[test]
    fn test_decode_failure_maps_to_invalid_argument() {
        let status: Status = GatewayError::decode("unterminated predicate").into();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[test]
    fn test_deadline_maps_to_deadline_exceeded() {
        let status: Status = GatewayError::DeadlineExceeded("set".into()).into();
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }
}
