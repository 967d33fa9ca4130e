//! In-memory datastore.
//!
//! Keeps committed leaves in a map keyed by store-dialect path. Container and
//! list nodes are implicit: they exist while something below them does, so
//! records without a value are never stored.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::{Datastore, DatastoreSession, SchemaModule, SessionKind, WriteOp, covers};
use crate::error::{GatewayError, Result};
use crate::event::{ChangeEvent, EventChannel, SubscriberId};
use crate::path;
use crate::value::{RecordValue, ValueRecord};

/// A datastore held entirely in process memory.
pub struct MemoryDatastore {
    name: String,
    shared: Arc<Shared>,
}

struct Shared {
    modules: Vec<SchemaModule>,
    state: Mutex<State>,
    events: EventChannel<ChangeEvent>,
    next_session: AtomicU64,
}

#[derive(Default)]
struct State {
    data: BTreeMap<String, RecordValue>,
    subscriptions: Vec<EventSubscription>,
    open_sessions: HashSet<u64>,
}

struct EventSubscription {
    session: u64,
    path: String,
    subscriber: SubscriberId,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryDatastore {
    /// Create an empty datastore advertising `modules`.
    pub fn new(name: impl Into<String>, modules: Vec<SchemaModule>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                modules,
                state: Mutex::new(State::default()),
                events: EventChannel::new(),
                next_session: AtomicU64::new(0),
            }),
        }
    }

    /// Seed committed data without raising events.
    pub fn with_records(self, records: impl IntoIterator<Item = ValueRecord>) -> Self {
        {
            let mut state = self.shared.state();
            for record in records {
                if *record.value() != RecordValue::Unknown {
                    state
                        .data
                        .insert(record.path().to_string(), record.value().clone());
                }
            }
        }
        self
    }

    /// Committed records, in path order.
    pub fn snapshot(&self) -> Vec<ValueRecord> {
        self.shared
            .state()
            .data
            .iter()
            .map(|(path, value)| ValueRecord::with_value(path.as_str(), value.clone()))
            .collect()
    }

    pub fn open_sessions(&self) -> usize {
        self.shared.state().open_sessions.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.state().subscriptions.len()
    }
}

impl Datastore for MemoryDatastore {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_session(&self, kind: SessionKind) -> Result<Box<dyn DatastoreSession>> {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.state().open_sessions.insert(id);

        Ok(Box::new(MemorySession {
            id,
            kind,
            shared: self.shared.clone(),
            staged: Vec::new(),
            closed: false,
        }))
    }

    fn event_channel(&self) -> &EventChannel<ChangeEvent> {
        &self.shared.events
    }
}

struct MemorySession {
    id: u64,
    kind: SessionKind,
    shared: Arc<Shared>,
    staged: Vec<(WriteOp, ValueRecord)>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GatewayError::session(format!("session {} is closed", self.id)));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.kind != SessionKind::ReadWrite {
            return Err(GatewayError::store(format!(
                "session {} is read-only",
                self.id
            )));
        }
        Ok(())
    }
}

fn validate_path(store_path: &str) -> Result<()> {
    path::decode(store_path)
        .map(|_| ())
        .map_err(|e| GatewayError::store(format!("invalid path '{}': {}", store_path, e)))
}

impl DatastoreSession for MemorySession {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    fn read_batch(&mut self, paths: &[String]) -> Result<Vec<ValueRecord>> {
        self.ensure_open()?;
        for p in paths {
            validate_path(p)?;
        }

        let state = self.shared.state();
        let data = &state.data;
        let records = paths
            .iter()
            .flat_map(|requested| {
                data.iter()
                    .filter(move |(stored, _)| covers(requested, stored))
            })
            .map(|(stored, value)| ValueRecord::with_value(stored.as_str(), value.clone()))
            .collect();
        Ok(records)
    }

    fn write_batch(&mut self, op: WriteOp, records: &[ValueRecord]) -> Result<Vec<String>> {
        self.ensure_writable()?;
        for record in records {
            validate_path(record.path())?;
        }

        self.staged
            .extend(records.iter().map(|record| (op, record.clone())));
        debug!(session = self.id, %op, count = records.len(), "Staged writes");
        Ok(records.iter().map(|r| r.path().to_string()).collect())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let staged = std::mem::take(&mut self.staged);

        let events = {
            let mut state = self.shared.state();
            let mut changed = Vec::new();

            for (op, record) in staged {
                if matches!(op, WriteOp::Delete | WriteOp::Replace) {
                    let removed: Vec<String> = state
                        .data
                        .keys()
                        .filter(|stored| covers(record.path(), stored))
                        .cloned()
                        .collect();
                    for stored in removed {
                        state.data.remove(&stored);
                        changed.push(ValueRecord::new(stored));
                    }
                }
                if op != WriteOp::Delete && *record.value() != RecordValue::Unknown {
                    state
                        .data
                        .insert(record.path().to_string(), record.value().clone());
                    changed.push(record);
                }
            }

            pending_events(&state.subscriptions, &changed)
        };

        info!(session = self.id, events = events.len(), "Committed staged writes");

        // Dispatch without holding the state lock.
        for event in events {
            if let Err(e) = self.shared.events.send(&event) {
                warn!(subscriber = %event.subscriber, error = %e, "Dropping change event");
            }
        }
        Ok(())
    }

    fn list_schemas(&mut self) -> Result<Vec<SchemaModule>> {
        self.ensure_open()?;
        Ok(self.shared.modules.clone())
    }

    fn subscribe_events(&mut self, path: &str, subscriber: SubscriberId) -> Result<()> {
        self.ensure_open()?;
        validate_path(path)?;

        self.shared.state().subscriptions.push(EventSubscription {
            session: self.id,
            path: path.to_string(),
            subscriber,
        });
        debug!(session = self.id, %subscriber, path, "Event subscription added");
        Ok(())
    }

    fn clear(&mut self) {
        self.staged.clear();
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        let mut state = self.shared.state();
        state.subscriptions.retain(|s| s.session != self.id);
        state.open_sessions.remove(&self.id);
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.closed {
            let mut state = self.shared.state();
            state.subscriptions.retain(|s| s.session != self.id);
            state.open_sessions.remove(&self.id);
        }
    }
}

/// Group changed records by the subscribers whose paths cover them.
fn pending_events(
    subscriptions: &[EventSubscription],
    changed: &[ValueRecord],
) -> Vec<ChangeEvent> {
    let mut by_subscriber: BTreeMap<SubscriberId, Vec<ValueRecord>> = BTreeMap::new();

    for record in changed {
        let mut notified = HashSet::new();
        for sub in subscriptions {
            if covers(&sub.path, record.path()) && notified.insert(sub.subscriber) {
                by_subscriber
                    .entry(sub.subscriber)
                    .or_default()
                    .push(record.clone());
            }
        }
    }

    by_subscriber
        .into_iter()
        .map(|(subscriber, records)| ChangeEvent {
            subscriber,
            records,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventReceiver;

    #[derive(Default)]
    struct Collector {
        events: Mutex<Vec<ChangeEvent>>,
    }

    impl EventReceiver<ChangeEvent> for Collector {
        fn on_event(&self, event: &ChangeEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn seeded() -> MemoryDatastore {
        MemoryDatastore::new("running", vec![SchemaModule::new("m", "2024-01-01")]).with_records([
            ValueRecord::with_value("/m/top/a", 1i64),
            ValueRecord::with_value("/m/top/b", "x"),
            ValueRecord::with_value("/m/other", "y"),
        ])
    }

    #[test]
    fn test_read_subtree() {
        let store = seeded();
        let mut session = store.open_session(SessionKind::ReadOnly).unwrap();

        let records = session.read_batch(&["/m/top".to_string()]).unwrap();
        let paths: Vec<&str> = records.iter().map(|r| r.path()).collect();
        assert_eq!(paths, vec!["/m/top/a", "/m/top/b"]);

        assert!(session.read_batch(&["/m/missing".to_string()]).unwrap().is_empty());
        session.close().unwrap();
    }

    #[test]
    fn test_read_only_session_rejects_writes() {
        let store = seeded();
        let mut session = store.open_session(SessionKind::ReadOnly).unwrap();

        let result = session.write_batch(WriteOp::Update, &[ValueRecord::with_value("/m/a", "1")]);
        assert!(matches!(result, Err(GatewayError::StoreOperation(_))));
        assert!(matches!(session.commit(), Err(GatewayError::StoreOperation(_))));
    }

    #[test]
    fn test_writes_apply_only_on_commit() {
        let store = seeded();
        let mut session = store.open_session(SessionKind::ReadWrite).unwrap();

        session
            .write_batch(WriteOp::Delete, &[ValueRecord::new("/m/top")])
            .unwrap();
        session
            .write_batch(WriteOp::Update, &[ValueRecord::with_value("/m/new", 5i64)])
            .unwrap();
        assert_eq!(store.snapshot().len(), 3);

        session.commit().unwrap();
        assert_eq!(
            store.snapshot(),
            vec![
                ValueRecord::with_value("/m/new", 5i64),
                ValueRecord::with_value("/m/other", "y"),
            ]
        );
    }

    #[test]
    fn test_replace_clears_subtree() {
        let store = seeded();
        let mut session = store.open_session(SessionKind::ReadWrite).unwrap();

        session
            .write_batch(
                WriteOp::Replace,
                &[
                    ValueRecord::new("/m/top"),
                    ValueRecord::with_value("/m/top/c", "z"),
                ],
            )
            .unwrap();
        session.commit().unwrap();

        let mut reader = store.open_session(SessionKind::ReadOnly).unwrap();
        let records = reader.read_batch(&["/m/top".to_string()]).unwrap();
        assert_eq!(records, vec![ValueRecord::with_value("/m/top/c", "z")]);
    }

    #[test]
    fn test_invalid_path_rejected() {
        let store = seeded();
        let mut session = store.open_session(SessionKind::ReadWrite).unwrap();

        let result = session.write_batch(WriteOp::Update, &[ValueRecord::with_value("/m/a[", "1")]);
        assert!(matches!(result, Err(GatewayError::StoreOperation(_))));
    }

    #[test]
    fn test_commit_raises_events_per_subscriber() {
        let store = seeded();
        let collector = Arc::new(Collector::default());
        store.event_channel().register(collector.clone());

        let mut watcher = store.open_session(SessionKind::ReadOnly).unwrap();
        watcher.subscribe_events("/m/top", SubscriberId(1)).unwrap();
        watcher.subscribe_events("/m/top/a", SubscriberId(1)).unwrap();
        watcher.subscribe_events("/m/other", SubscriberId(2)).unwrap();

        let mut writer = store.open_session(SessionKind::ReadWrite).unwrap();
        writer
            .write_batch(WriteOp::Update, &[ValueRecord::with_value("/m/top/a", 2i64)])
            .unwrap();
        writer.commit().unwrap();

        let events = collector.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subscriber, SubscriberId(1));
        // Covered by two subscriptions of the same subscriber, reported once.
        assert_eq!(events[0].records, vec![ValueRecord::with_value("/m/top/a", 2i64)]);
    }

    #[test]
    fn test_commit_without_receiver_still_succeeds() {
        let store = seeded();
        let mut watcher = store.open_session(SessionKind::ReadOnly).unwrap();
        watcher.subscribe_events("/m", SubscriberId(1)).unwrap();

        let mut writer = store.open_session(SessionKind::ReadWrite).unwrap();
        writer
            .write_batch(WriteOp::Delete, &[ValueRecord::new("/m/other")])
            .unwrap();
        assert!(writer.commit().is_ok());
    }

    #[test]
    fn test_close_drops_subscriptions() {
        let store = seeded();
        let mut session = store.open_session(SessionKind::ReadOnly).unwrap();
        session.subscribe_events("/m", SubscriberId(1)).unwrap();
        assert_eq!(store.subscription_count(), 1);

        session.close().unwrap();
        assert_eq!(store.subscription_count(), 0);
        assert_eq!(store.open_sessions(), 0);
        assert!(matches!(session.close(), Err(GatewayError::Session(_))));
    }

    #[test]
    fn test_list_schemas() {
        let store = seeded();
        let mut session = store.open_session(SessionKind::ReadOnly).unwrap();
        assert_eq!(
            session.list_schemas().unwrap(),
            vec![SchemaModule::new("m", "2024-01-01")]
        );
    }
}
