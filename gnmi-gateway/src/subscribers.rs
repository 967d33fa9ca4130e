//! Registry of open Subscribe streams.
//!
//! Each Subscribe call registers its outbound sender under a fresh
//! [`SubscriberId`]. The registry itself is the receiver on the datastore's
//! [`EventChannel`](crate::event::EventChannel) and routes every change event
//! to the stream it was raised for. Writes to a stream only ever go through
//! its bounded channel, so the callback thread never touches the transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tonic::Status;
use tracing::{debug, warn};

use crate::event::{ChangeEvent, EventReceiver, SubscriberId};
use crate::gnmi::{SubscribeResponse, subscribe_response};
use crate::notification::build_notification;

/// Sending half of a Subscribe response stream.
pub type ResponseSender = mpsc::Sender<Result<SubscribeResponse, Status>>;

/// Maps subscriber ids to their response streams.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    streams: RwLock<HashMap<SubscriberId, ResponseSender>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response stream and return its id.
    pub fn register(&self, sender: ResponseSender) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
        debug!(subscriber = %id, "Subscriber registered");
        id
    }

    /// Drop a stream. Returns false if it was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self
            .streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sender(&self, id: SubscriberId) -> Option<ResponseSender> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

impl EventReceiver<ChangeEvent> for SubscriberRegistry {
    fn on_event(&self, event: &ChangeEvent) {
        let Some(sender) = self.sender(event.subscriber) else {
            debug!(subscriber = %event.subscriber, "Dropping event for unknown subscriber");
            return;
        };

        let notification = build_notification(None, &event.records);
        let updates = notification.update.len();
        let response = SubscribeResponse {
            response: Some(subscribe_response::Response::Update(notification)),
        };

        match sender.try_send(Ok(response)) {
            Ok(()) => {
                debug!(subscriber = %event.subscriber, updates, "Delivered change notification");
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    subscriber = %event.subscriber,
                    updates,
                    "Subscriber is not keeping up, dropping change notification"
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %event.subscriber, "Subscriber stream closed");
            }
        }
    }
}
