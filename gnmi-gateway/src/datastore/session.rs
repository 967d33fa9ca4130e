//! Scoped datastore sessions.

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use super::{Datastore, DatastoreSession, SessionKind};
use crate::error::Result;

/// Owns a datastore session for the duration of one RPC.
///
/// The session is cleared and closed exactly once: by [`release`](Self::release)
/// on the success path, or on drop for every other exit.
pub struct SessionGuard {
    session: Box<dyn DatastoreSession>,
    datastore: String,
    released: bool,
}

impl SessionGuard {
    /// Open a session on `datastore`.
    pub fn open(datastore: &dyn Datastore, kind: SessionKind) -> Result<Self> {
        let session = datastore.open_session(kind)?;
        debug!(datastore = %datastore.name(), ?kind, "Session opened");
        Ok(Self {
            session,
            datastore: datastore.name().to_string(),
            released: false,
        })
    }

    /// Clear working state and close the session, reporting close failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.session.clear();
        let result = self.session.close();
        debug!(datastore = %self.datastore, ok = result.is_ok(), "Session released");
        result
    }
}

impl Deref for SessionGuard {
    type Target = dyn DatastoreSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.session.clear();
        match self.session.close() {
            Ok(()) => debug!(datastore = %self.datastore, "Session released on early exit"),
            Err(e) => warn!(datastore = %self.datastore, error = %e, "Failed to close session"),
        }
    }
}
