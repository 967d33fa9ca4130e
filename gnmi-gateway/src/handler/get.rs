//! Get: one notification per requested path.

use tracing::{debug, warn};

use super::CancelFlag;
use crate::datastore::{Datastore, SessionGuard, SessionKind};
use crate::error::Result;
use crate::gnmi::{GetRequest, GetResponse};
use crate::notification::build_notification;
use crate::path;

pub(super) fn get(
    datastore: &dyn Datastore,
    request: &GetRequest,
    cancel: &CancelFlag,
) -> Result<GetResponse> {
    let mut session = SessionGuard::open(datastore, SessionKind::ReadOnly)?;
    let mut notifications = Vec::with_capacity(request.path.len());

    debug!(
        paths = request.path.len(),
        data_type = request.r#type,
        encoding = request.encoding,
        "Get request"
    );

    for requested in &request.path {
        let store_path = match path::store_path(request.prefix.as_ref(), Some(requested)) {
            Ok(store_path) => store_path,
            Err(e) => {
                warn!(error = %e, "Skipping unrenderable Get path");
                continue;
            }
        };

        cancel.check("read")?;
        // One logical path may fan out to many concrete records.
        let records = session.read_batch(std::slice::from_ref(&store_path))?;
        debug!(path = %store_path, matches = records.len(), "Read path");

        notifications.push(build_notification(request.prefix.clone(), &records));
    }

    session.release()?;

    Ok(GetResponse {
        notification: notifications,
        ..Default::default()
    })
}
