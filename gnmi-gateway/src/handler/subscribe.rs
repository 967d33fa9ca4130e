//! Subscribe: inbound read loop that registers datastore subscriptions.

use std::sync::Arc;

use tokio_stream::{Stream, StreamExt};
use tonic::Status;
use tracing::{debug, info, warn};

use super::blocking;
use crate::datastore::{Datastore, DatastoreSession, SessionGuard, SessionKind};
use crate::error::Result;
use crate::event::{ChangeEvent, EventReceiver, SubscriberId};
use crate::gnmi::{SubscribeRequest, SubscriptionList, subscribe_request};
use crate::path;

/// Run one Subscribe stream until the client closes it.
///
/// Waiting for client messages holds no thread. The session moves onto the
/// blocking pool for each datastore call and back. Change notifications are
/// not written here; the datastore raises them through its event channel
/// into `receiver`.
pub(super) async fn serve<S>(
    datastore: Arc<dyn Datastore>,
    receiver: Arc<dyn EventReceiver<ChangeEvent>>,
    id: SubscriberId,
    mut inbound: S,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<SubscribeRequest, Status>> + Unpin,
{
    let store = datastore.clone();
    let mut session =
        blocking(move || SessionGuard::open(store.as_ref(), SessionKind::ReadOnly)).await?;
    datastore.event_channel().register(receiver);

    while let Some(message) = inbound.next().await {
        let request = match message {
            Ok(request) => request,
            Err(status) => {
                info!(subscriber = %id, code = ?status.code(), "Subscribe stream ended by client");
                break;
            }
        };

        match request.request {
            Some(subscribe_request::Request::Subscribe(list)) => {
                session = blocking(move || {
                    register_list(&mut *session, id, &list)?;
                    Ok(session)
                })
                .await?;
            }
            Some(subscribe_request::Request::Poll(_)) => {
                debug!(subscriber = %id, "Ignoring poll request");
            }
            Some(subscribe_request::Request::Aliases(_)) => {
                debug!(subscriber = %id, "Ignoring alias request");
            }
            None => debug!(subscriber = %id, "Ignoring empty subscribe request"),
        }
    }

    blocking(move || session.release()).await
}

/// One datastore subscription per entry, keyed by list prefix + entry path.
fn register_list(
    session: &mut dyn DatastoreSession,
    id: SubscriberId,
    list: &SubscriptionList,
) -> Result<()> {
    for entry in &list.subscription {
        let store_path = match path::store_path(list.prefix.as_ref(), entry.path.as_ref()) {
            Ok(store_path) => store_path,
            Err(e) => {
                warn!(subscriber = %id, error = %e, "Skipping unrenderable subscription path");
                continue;
            }
        };

        session.subscribe_events(&store_path, id)?;
        info!(subscriber = %id, path = %store_path, "Subscribed to changes");
    }
    Ok(())
}
