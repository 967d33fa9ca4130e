//! Shared test fixtures.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gnmi_gateway::config::GatewaySettings;
use gnmi_gateway::datastore::{
    Datastore, DatastoreSession, SchemaModule, SessionKind, WriteOp,
};
use gnmi_gateway::event::{ChangeEvent, EventChannel, SubscriberId};
use gnmi_gateway::gnmi::{
    Path, SubscribeRequest, Subscription, SubscriptionList, subscribe_request,
};
use gnmi_gateway::{GatewayError, GnmiService, MemoryDatastore, Result, ValueRecord, path};

/// Datastore operation that a [`RecordingDatastore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Read,
    Write,
    Commit,
    Subscribe,
}

/// Every call made against a [`RecordingDatastore`].
#[derive(Debug, Default)]
pub struct Calls {
    pub opened: Vec<SessionKind>,
    pub closed: usize,
    pub cleared: usize,
    pub reads: Vec<String>,
    pub writes: Vec<(WriteOp, Vec<String>)>,
    pub commits: usize,
    pub subscriptions: Vec<(String, SubscriberId)>,
}

/// A datastore that records calls and returns canned reads.
pub struct RecordingDatastore {
    calls: Arc<Mutex<Calls>>,
    reads: Vec<ValueRecord>,
    failure: Option<Failure>,
    events: EventChannel<ChangeEvent>,
}

impl RecordingDatastore {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Calls::default())),
            reads: Vec::new(),
            failure: None,
            events: EventChannel::new(),
        }
    }

    /// Records returned by every read.
    pub fn with_reads(mut self, records: Vec<ValueRecord>) -> Self {
        self.reads = records;
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }
}

impl Datastore for RecordingDatastore {
    fn name(&self) -> &str {
        "recording"
    }

    fn open_session(&self, kind: SessionKind) -> Result<Box<dyn DatastoreSession>> {
        self.calls().opened.push(kind);
        Ok(Box::new(RecordingSession {
            kind,
            calls: self.calls.clone(),
            reads: self.reads.clone(),
            failure: self.failure,
        }))
    }

    fn event_channel(&self) -> &EventChannel<ChangeEvent> {
        &self.events
    }
}

struct RecordingSession {
    kind: SessionKind,
    calls: Arc<Mutex<Calls>>,
    reads: Vec<ValueRecord>,
    failure: Option<Failure>,
}

impl RecordingSession {
    fn check(&self, op: Failure) -> Result<()> {
        if self.failure == Some(op) {
            return Err(GatewayError::store(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

impl DatastoreSession for RecordingSession {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    fn read_batch(&mut self, paths: &[String]) -> Result<Vec<ValueRecord>> {
        self.calls.lock().unwrap().reads.extend(paths.iter().cloned());
        self.check(Failure::Read)?;
        Ok(self.reads.clone())
    }

    fn write_batch(&mut self, op: WriteOp, records: &[ValueRecord]) -> Result<Vec<String>> {
        let paths: Vec<String> = records.iter().map(|r| r.path().to_string()).collect();
        self.calls.lock().unwrap().writes.push((op, paths.clone()));
        self.check(Failure::Write)?;
        Ok(paths)
    }

    fn commit(&mut self) -> Result<()> {
        self.check(Failure::Commit)?;
        self.calls.lock().unwrap().commits += 1;
        Ok(())
    }

    fn list_schemas(&mut self) -> Result<Vec<SchemaModule>> {
        Ok(vec![SchemaModule::new("m", "2024-01-01")])
    }

    fn subscribe_events(&mut self, path: &str, subscriber: SubscriberId) -> Result<()> {
        self.check(Failure::Subscribe)?;
        self.calls
            .lock()
            .unwrap()
            .subscriptions
            .push((path.to_string(), subscriber));
        Ok(())
    }

    fn clear(&mut self) {
        self.calls.lock().unwrap().cleared += 1;
    }

    fn close(&mut self) -> Result<()> {
        self.calls.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// An in-memory datastore whose writes take `delay` each.
pub struct SlowDatastore {
    inner: Arc<MemoryDatastore>,
    delay: Duration,
}

impl SlowDatastore {
    pub fn new(inner: Arc<MemoryDatastore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl Datastore for SlowDatastore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open_session(&self, kind: SessionKind) -> Result<Box<dyn DatastoreSession>> {
        Ok(Box::new(SlowSession {
            inner: self.inner.open_session(kind)?,
            delay: self.delay,
        }))
    }

    fn event_channel(&self) -> &EventChannel<ChangeEvent> {
        self.inner.event_channel()
    }
}

struct SlowSession {
    inner: Box<dyn DatastoreSession>,
    delay: Duration,
}

impl DatastoreSession for SlowSession {
    fn kind(&self) -> SessionKind {
        self.inner.kind()
    }

    fn read_batch(&mut self, paths: &[String]) -> Result<Vec<ValueRecord>> {
        self.inner.read_batch(paths)
    }

    fn write_batch(&mut self, op: WriteOp, records: &[ValueRecord]) -> Result<Vec<String>> {
        std::thread::sleep(self.delay);
        self.inner.write_batch(op, records)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn list_schemas(&mut self) -> Result<Vec<SchemaModule>> {
        self.inner.list_schemas()
    }

    fn subscribe_events(&mut self, path: &str, subscriber: SubscriberId) -> Result<()> {
        self.inner.subscribe_events(path, subscriber)
    }

    fn clear(&mut self) {
        self.inner.clear()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

pub fn service(datastore: Arc<dyn Datastore>) -> GnmiService {
    GnmiService::new(datastore, GatewaySettings::default())
}

pub fn service_with_timeout(datastore: Arc<dyn Datastore>, timeout_ms: u64) -> GnmiService {
    let settings = GatewaySettings {
        request_timeout_ms: timeout_ms,
        ..Default::default()
    };
    GnmiService::new(datastore, settings)
}

pub fn gnmi_path(s: &str) -> Path {
    path::decode(s).unwrap()
}

pub fn subscribe_request(prefix: &str, entries: &[&str]) -> SubscribeRequest {
    SubscribeRequest {
        request: Some(subscribe_request::Request::Subscribe(SubscriptionList {
            prefix: Some(gnmi_path(prefix)),
            subscription: entries
                .iter()
                .map(|p| Subscription {
                    path: Some(gnmi_path(p)),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        })),
    }
}
