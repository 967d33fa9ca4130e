//! The datastore boundary.
//!
//! The gateway only talks to the datastore through [`Datastore`] and
//! [`DatastoreSession`]. Calls are blocking; the request handler runs them on
//! tokio's blocking pool. Paths crossing this boundary are in the store
//! dialect (see [`crate::path`]).

mod memory;
mod registry;
mod session;

pub use memory::MemoryDatastore;
pub use registry::DatastoreRegistry;
pub use session::SessionGuard;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{ChangeEvent, EventChannel, SubscriberId};
use crate::value::ValueRecord;

/// Access requested when opening a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Reads, schema listing and event subscriptions.
    ReadOnly,
    /// Everything, including staged writes and commit.
    ReadWrite,
}

/// How a batch of records is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Remove the node and everything below it.
    Delete,
    /// Remove everything below the node, then set it.
    Replace,
    /// Set the node, leaving siblings and descendants alone.
    Update,
}

impl WriteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOp::Delete => "delete",
            WriteOp::Replace => "replace",
            WriteOp::Update => "update",
        }
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A schema module installed in the datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModule {
    pub name: String,
    #[serde(default)]
    pub revision: String,
}

impl SchemaModule {
    pub fn new(name: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: revision.into(),
        }
    }
}

/// A datastore instance the gateway can open sessions against.
pub trait Datastore: Send + Sync {
    /// Instance name, as selected in the configuration.
    fn name(&self) -> &str;

    /// Open a new session.
    fn open_session(&self, kind: SessionKind) -> Result<Box<dyn DatastoreSession>>;

    /// Channel the datastore raises change events on.
    fn event_channel(&self) -> &EventChannel<ChangeEvent>;
}

/// One session against a datastore.
pub trait DatastoreSession: Send {
    fn kind(&self) -> SessionKind;

    /// Read every record at or below each of `paths`.
    fn read_batch(&mut self, paths: &[String]) -> Result<Vec<ValueRecord>>;

    /// Stage `records` for the next commit. Returns the paths that were staged.
    fn write_batch(&mut self, op: WriteOp, records: &[ValueRecord]) -> Result<Vec<String>>;

    /// Apply staged writes.
    fn commit(&mut self) -> Result<()>;

    fn list_schemas(&mut self) -> Result<Vec<SchemaModule>>;

    /// Raise change events for `subscriber` whenever data at or below `path`
    /// is committed. The subscription lives as long as the session.
    fn subscribe_events(&mut self, path: &str, subscriber: SubscriberId) -> Result<()>;

    /// Drop staged writes and any other working state.
    fn clear(&mut self);

    fn close(&mut self) -> Result<()>;
}

/// Whether `parent` addresses `child` or one of its ancestors.
pub fn covers(parent: &str, child: &str) -> bool {
    if parent.is_empty() || parent == "/" {
        return true;
    }
    match child.strip_prefix(parent) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('['),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers() {
        assert!(covers("/", "/m/a"));
        assert!(covers("/m/a", "/m/a"));
        assert!(covers("/m/a", "/m/a/b"));
        assert!(covers("/m/list", "/m/list[name='x']/mtu"));
        assert!(!covers("/m/a", "/m/ab"));
        assert!(!covers("/m/a/b", "/m/a"));
    }

    #[test]
    fn test_write_op_display() {
        assert_eq!(WriteOp::Delete.to_string(), "delete");
        assert_eq!(WriteOp::Replace.to_string(), "replace");
        assert_eq!(WriteOp::Update.to_string(), "update");
    }
}
