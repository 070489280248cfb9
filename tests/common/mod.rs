//! Shared helpers for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use kubeform::runtime::{
    Attributes, Created, CrudAdapter, FieldBinding, FieldOwner, InMemoryStore, ManagedObject,
    ObjectKey, ObjectStatus, ObjectStore, PluginError, ResourceBinding, StoreError, WatchEvent,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Provider operation recorded by [`ScriptedAdapter`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Read,
    Update,
    Delete,
}

/// One recorded provider call
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub op: Op,
    pub id: Option<String>,
    pub attrs: Attributes,
}

#[derive(Default)]
struct Provider {
    resources: BTreeMap<String, Attributes>,
    next_id: u64,
    failures: HashMap<Op, VecDeque<PluginError>>,
    latency: HashMap<Op, Duration>,
    calls: Vec<Call>,
}

/// In-memory provider whose failures are scripted per operation.
///
/// Successful calls behave like a real provider: create assigns an ID and
/// computes `url`, update merges the changed attributes, delete of an
/// unknown ID reports `NotFound`.
///
/// A call with latency applies its effect first and answers after the
/// delay, like a provider whose response is slow to come back.
#[derive(Default)]
pub struct ScriptedAdapter {
    inner: Mutex<Provider>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

// Counts one outstanding provider call.
struct Outstanding<'a>(&'a AtomicUsize);

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` with `err`; queued failures are consumed in order
    pub fn fail_next(&self, op: Op, err: PluginError) {
        self.inner
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Answer every later call of `op` only after `delay`
    pub fn set_latency(&self, op: Op, delay: Duration) {
        self.inner.lock().latency.insert(op, delay);
    }

    /// Most provider calls ever outstanding at the same time
    pub fn max_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    /// Recorded calls of one operation
    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Current external state of `id`
    pub fn resource(&self, id: &str) -> Option<Attributes> {
        self.inner.lock().resources.get(id).cloned()
    }

    /// Number of live external resources
    pub fn resource_count(&self) -> usize {
        self.inner.lock().resources.len()
    }

    /// Change an attribute out of band, as a console edit would
    pub fn tamper(&self, id: &str, key: &str, value: Value) {
        if let Some(attrs) = self.inner.lock().resources.get_mut(id) {
            attrs.insert(key.to_string(), value);
        }
    }

    /// Remove a resource out of band
    pub fn forget(&self, id: &str) {
        self.inner.lock().resources.remove(id);
    }

    fn enter(&self) -> Outstanding<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Outstanding(&self.active)
    }

    async fn respond(&self, op: Op) {
        let delay = self.inner.lock().latency.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn begin(&self, op: Op, id: Option<&str>, attrs: &Attributes) -> Result<(), PluginError> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call {
            op,
            id: id.map(str::to_string),
            attrs: attrs.clone(),
        });
        match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CrudAdapter for ScriptedAdapter {
    async fn create(&self, _resource_type: &str, attrs: &Attributes) -> Result<Created, PluginError> {
        let _call = self.enter();
        self.begin(Op::Create, None, attrs)?;
        let created = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = format!("ext-{}", inner.next_id);
            let mut state = attrs.clone();
            state.insert("id".into(), json!(id));
            state.insert("url".into(), json!(format!("https://example.test/alerts/{id}")));
            inner.resources.insert(id.clone(), state.clone());
            Created { id, observed: state }
        };
        self.respond(Op::Create).await;
        Ok(created)
    }

    async fn read(&self, _resource_type: &str, id: &str) -> Result<Option<Attributes>, PluginError> {
        let _call = self.enter();
        self.begin(Op::Read, Some(id), &Map::new())?;
        let state = self.inner.lock().resources.get(id).cloned();
        self.respond(Op::Read).await;
        Ok(state)
    }

    async fn update(
        &self,
        _resource_type: &str,
        id: &str,
        changed: &Attributes,
    ) -> Result<Attributes, PluginError> {
        let _call = self.enter();
        self.begin(Op::Update, Some(id), changed)?;
        let state = {
            let mut inner = self.inner.lock();
            let state = inner.resources.get_mut(id).ok_or(PluginError::NotFound)?;
            for (k, v) in changed {
                state.insert(k.clone(), v.clone());
            }
            state.clone()
        };
        self.respond(Op::Update).await;
        Ok(state)
    }

    async fn delete(&self, _resource_type: &str, id: &str) -> Result<(), PluginError> {
        let _call = self.enter();
        self.begin(Op::Delete, Some(id), &Map::new())?;
        let removed = self.inner.lock().resources.remove(id);
        self.respond(Op::Delete).await;
        match removed {
            Some(_) => Ok(()),
            None => Err(PluginError::NotFound),
        }
    }
}

/// [`InMemoryStore`] whose finalizer removals can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    finalizer_failures: Mutex<VecDeque<StoreError>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `remove_finalizer` call with `err`
    pub fn fail_next_finalizer_removal(&self, err: StoreError) {
        self.finalizer_failures.lock().push_back(err);
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, StoreError> {
        self.inner.get(key).await
    }

    async fn list(&self, kind: &str) -> Result<Vec<ManagedObject>, StoreError> {
        self.inner.list(kind).await
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.watch()
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        status: ObjectStatus,
    ) -> Result<u64, StoreError> {
        self.inner.update_status(key, resource_version, status).await
    }

    async fn add_finalizer(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        finalizer: &str,
    ) -> Result<u64, StoreError> {
        self.inner.add_finalizer(key, resource_version, finalizer).await
    }

    async fn remove_finalizer(&self, key: &ObjectKey, finalizer: &str) -> Result<(), StoreError> {
        let failure = self.finalizer_failures.lock().pop_front();
        match failure {
            Some(err) => Err(err),
            None => self.inner.remove_finalizer(key, finalizer).await,
        }
    }
}

/// Binding of a trimmed-down `wavefront_alert` kind used by runtime tests
pub fn alert_binding() -> ResourceBinding {
    ResourceBinding::new("Alert", "wavefront_alert", "wavefront.kubeform.com", "v1alpha1")
        .field(FieldBinding::new("api_token", "api_token", FieldOwner::Spec).with_sensitive())
        .field(FieldBinding::new("condition", "condition", FieldOwner::Spec))
        .field(FieldBinding::new("id", "id", FieldOwner::Status).with_computed())
        .field(FieldBinding::new("minutes", "minutes", FieldOwner::Spec))
        .field(FieldBinding::new("name", "name", FieldOwner::Spec))
        .field(FieldBinding::new("tags", "tags", FieldOwner::Spec).with_set_semantics())
        .field(FieldBinding::new("url", "url", FieldOwner::Status).with_computed())
}

/// A spec object from JSON
pub fn spec(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("spec must be an object, got {other}"),
    }
}

/// Path of a file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
