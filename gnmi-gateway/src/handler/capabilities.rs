//! Capabilities: the schema modules and encodings the gateway serves.

use tracing::debug;

use crate::datastore::{Datastore, SessionGuard, SessionKind};
use crate::error::Result;
use crate::gnmi::{CapabilityResponse, Encoding, ModelData};

/// gNMI specification version implemented by the service.
pub const GNMI_VERSION: &str = "0.7.0";

/// The one encoding structured payloads are exchanged in.
pub const SUPPORTED_ENCODING: Encoding = Encoding::JsonIetf;

pub(super) fn capabilities(datastore: &dyn Datastore) -> Result<CapabilityResponse> {
    let mut session = SessionGuard::open(datastore, SessionKind::ReadOnly)?;
    let modules = session.list_schemas()?;
    session.release()?;

    debug!(modules = modules.len(), "Listed schema modules");

    Ok(CapabilityResponse {
        supported_models: modules
            .into_iter()
            .map(|module| ModelData {
                name: module.name,
                organization: String::new(),
                version: module.revision,
            })
            .collect(),
        supported_encodings: vec![SUPPORTED_ENCODING as i32],
        g_nmi_version: GNMI_VERSION.to_string(),
    })
}
