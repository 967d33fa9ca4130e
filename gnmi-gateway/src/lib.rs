//! gNMI gateway
//!
//! Serves the gNMI Capabilities, Get, Set and Subscribe RPCs over a
//! path-addressed datastore and relays datastore change events to
//! subscribed clients.

pub mod config;
pub mod datastore;
pub mod error;
pub mod event;
pub mod flatten;
pub mod handler;
pub mod notification;
pub mod path;
pub mod server;
pub mod subscribers;
pub mod value;

// Include the generated protobuf code
pub mod gnmi {
    tonic::include_proto!("gnmi");
}

pub use config::GatewayConfig;
pub use datastore::{Datastore, DatastoreRegistry, DatastoreSession, MemoryDatastore};
pub use error::{GatewayError, Result};
pub use handler::GnmiService;
pub use server::GatewayServer;
pub use value::{RecordValue, ValueRecord};
