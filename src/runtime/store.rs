use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

use super::error::StoreError;
use super::record::ObjectStatus;

/// Finalizer that guards deletion until the external resource is gone
pub const FINALIZER: &str = "kubeform.com/finalizer";

const WATCH_CAPACITY: usize = 1024;

/// Identity of a managed object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Kind of the object
    pub kind: String,
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ObjectKey {
    /// Build a key
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A desired-state object as the controller sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct ManagedObject {
    /// Identity
    pub key: ObjectKey,
    /// Incremented on every spec change
    pub generation: i64,
    /// Incremented on every write; used for optimistic concurrency
    pub resource_version: u64,
    /// Deletion was requested and waits on finalizers
    pub deletion_requested: bool,
    /// Finalizers holding the object
    pub finalizers: Vec<String>,
    /// User-supplied spec, keyed by wire name
    pub spec: Map<String, Value>,
    /// Controller-written status
    pub status: ObjectStatus,
}

impl ManagedObject {
    /// Whether `name` is among the object's finalizers
    pub fn has_finalizer(&self, name: &str) -> bool {
        self.finalizers.iter().any(|f| f == name)
    }
}

/// Change notification from the store.
///
/// Only spec changes, deletion requests and removals are announced; status
/// and finalizer writes made by controllers are not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    /// The object was created, its spec changed, or deletion was requested
    Applied(ObjectKey),
    /// The object is gone
    Deleted(ObjectKey),
}

impl WatchEvent {
    /// Key of the object the event is about
    pub fn key(&self) -> &ObjectKey {
        match self {
            WatchEvent::Applied(key) | WatchEvent::Deleted(key) => key,
        }
    }
}

/// Declarative object API consumed by the reconciliation runtime.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, StoreError>;

    /// List every object of a kind
    async fn list(&self, kind: &str) -> Result<Vec<ManagedObject>, StoreError>;

    /// Subscribe to change notifications
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;

    /// Replace the status if the object is still at `resource_version`.
    ///
    /// Returns the new resource version.
    async fn update_status(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        status: ObjectStatus,
    ) -> Result<u64, StoreError>;

    /// Add a finalizer if the object is still at `resource_version`
    async fn add_finalizer(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        finalizer: &str,
    ) -> Result<u64, StoreError>;

    /// Remove a finalizer; an object pending deletion with no finalizers left
    /// is removed
    async fn remove_finalizer(&self, key: &ObjectKey, finalizer: &str) -> Result<(), StoreError>;
}

/// In-process [`ObjectStore`] used by tests and local simulation.
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<ObjectKey, ManagedObject>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Create an object or replace its spec, as a user `apply` would.
    ///
    /// The generation only advances when the spec actually changes.
    pub fn apply(&self, key: ObjectKey, spec: Map<String, Value>) -> ManagedObject {
        let mut objects = self.objects.write();
        let obj = objects.entry(key.clone()).or_insert_with(|| ManagedObject {
            key: key.clone(),
            generation: 0,
            resource_version: 0,
            deletion_requested: false,
            finalizers: Vec::new(),
            spec: Map::new(),
            status: ObjectStatus::default(),
        });
        let changed = obj.generation == 0 || obj.spec != spec;
        if changed {
            obj.spec = spec;
            obj.generation += 1;
            obj.resource_version += 1;
        }
        let snapshot = obj.clone();
        drop(objects);
        if changed {
            self.notify(WatchEvent::Applied(key));
        }
        snapshot
    }

    /// Request deletion; objects without finalizers disappear immediately
    pub fn request_deletion(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut objects = self.objects.write();
        let obj = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if obj.finalizers.is_empty() {
            objects.remove(key);
            drop(objects);
            self.notify(WatchEvent::Deleted(key.clone()));
            return Ok(());
        }
        if !obj.deletion_requested {
            obj.deletion_requested = true;
            obj.resource_version += 1;
            drop(objects);
            self.notify(WatchEvent::Applied(key.clone()));
        }
        Ok(())
    }

    /// Synchronous snapshot of one object
    pub fn object(&self, key: &ObjectKey) -> Option<ManagedObject> {
        self.objects.read().get(key).cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn notify(&self, event: WatchEvent) {
        // No subscribers is not an error.
        if self.events.send(event).is_err() {
            debug!("Watch event dropped: no subscribers");
        }
    }

    fn with_current<T>(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        f: impl FnOnce(&mut ManagedObject) -> T,
    ) -> Result<T, StoreError> {
        let mut objects = self.objects.write();
        let obj = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if obj.resource_version != resource_version {
            return Err(StoreError::Conflict(key.to_string()));
        }
        let out = f(obj);
        obj.resource_version += 1;
        Ok(out)
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, StoreError> {
        Ok(self.object(key))
    }

    async fn list(&self, kind: &str) -> Result<Vec<ManagedObject>, StoreError> {
        Ok(self
            .objects
            .read()
            .values()
            .filter(|o| o.key.kind == kind)
            .cloned()
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        status: ObjectStatus,
    ) -> Result<u64, StoreError> {
        self.with_current(key, resource_version, |obj| {
            obj.status = status;
            obj.resource_version + 1
        })
    }

    async fn add_finalizer(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        finalizer: &str,
    ) -> Result<u64, StoreError> {
        self.with_current(key, resource_version, |obj| {
            if !obj.has_finalizer(finalizer) {
                obj.finalizers.push(finalizer.to_string());
            }
            obj.resource_version + 1
        })
    }

    async fn remove_finalizer(&self, key: &ObjectKey, finalizer: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write();
        let obj = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        obj.finalizers.retain(|f| f != finalizer);
        obj.resource_version += 1;
        if obj.deletion_requested && obj.finalizers.is_empty() {
            objects.remove(key);
            drop(objects);
            self.notify(WatchEvent::Deleted(key.clone()));
        }
        Ok(())
    }
}
