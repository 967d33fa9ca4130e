//! Single-slot synchronous event dispatch.
//!
//! The datastore owns one [`EventChannel`] and sends a [`ChangeEvent`] into it
//! whenever committed data matches a subscription. Whatever receiver was
//! registered last handles the event on the sender's thread.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{GatewayError, Result};
use crate::value::ValueRecord;

/// Identity of one Subscribe stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Changed records staged by the datastore for one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub subscriber: SubscriberId,
    pub records: Vec<ValueRecord>,
}

/// Handler for events sent through an [`EventChannel`].
pub trait EventReceiver<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// Holds at most one receiver. Registering again replaces the previous one.
pub struct EventChannel<E> {
    receiver: RwLock<Option<Arc<dyn EventReceiver<E>>>>,
}

impl<E> EventChannel<E> {
    pub fn new() -> Self {
        Self {
            receiver: RwLock::new(None),
        }
    }

    /// Store `receiver` as the only receiver.
    pub fn register(&self, receiver: Arc<dyn EventReceiver<E>>) {
        let mut slot = self.receiver.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(receiver);
    }

    pub fn has_receiver(&self) -> bool {
        self.receiver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Dispatch `event` to the registered receiver and wait for it to return.
    pub fn send(&self, event: &E) -> Result<()> {
        // Release the slot before dispatching so the receiver may re-register.
        let receiver = self
            .receiver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match receiver {
            Some(receiver) => {
                receiver.on_event(event);
                Ok(())
            }
            None => Err(GatewayError::NoReceiver),
        }
    }
}

impl<E> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("has_receiver", &self.has_receiver())
            .finish()
    }
}
