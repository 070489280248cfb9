#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{alert_binding, spec, FlakyStore, Op, ScriptedAdapter};
use kubeform::config::ReconcilerConfig;
use kubeform::runtime::{
    Action, ConditionStatus, Controller, CrudAdapter, InMemoryStore, ManagedObject, ObjectKey,
    ObjectStore, Phase, PluginError, ReconcileError, Reconciler, StoreError, CONDITION_DRIFTED,
    CONDITION_READY, CONDITION_STALLED, CONDITION_TERMINATION_BLOCKED, FINALIZER,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DRIFT: Duration = Duration::from_secs(60);

fn config() -> ReconcilerConfig {
    ReconcilerConfig {
        workers: 2,
        drift_interval: DRIFT,
        backoff_initial: Duration::from_millis(100),
        backoff_max: Duration::from_secs(1),
        backoff_multiplier: 2.0,
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    adapter: Arc<ScriptedAdapter>,
    reconciler: Reconciler,
    key: ObjectKey,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new());
        let reconciler = Reconciler::new(
            Arc::new(alert_binding()),
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            Arc::clone(&adapter) as Arc<dyn CrudAdapter>,
            &config(),
        );
        Self {
            store,
            adapter,
            reconciler,
            key: ObjectKey::new("Alert", "default", "high-cpu"),
        }
    }

    fn apply(&self, spec: Map<String, Value>) {
        self.store.apply(self.key.clone(), spec);
    }

    async fn reconcile(&self) -> Action {
        self.reconciler.reconcile(&self.key).await.unwrap()
    }

    fn object(&self) -> ManagedObject {
        self.store.object(&self.key).expect("object exists")
    }

    /// Apply the standard alert and run the create pass
    async fn created(&self) -> ManagedObject {
        self.apply(alert_spec(5));
        assert_eq!(self.reconcile().await, Action::Requeue(DRIFT));
        self.object()
    }
}

fn alert_spec(minutes: i64) -> Map<String, Value> {
    spec(json!({
        "name": "high-cpu",
        "condition": "ts(cpu.usage) > 90",
        "minutes": minutes,
        "tags": ["prod", "cpu"],
        "api_token": "s3cr3t-token",
        "terminationPolicy": "Delete",
    }))
}

fn condition(obj: &ManagedObject, type_: &str) -> Option<(ConditionStatus, String)> {
    obj.status
        .record
        .condition(type_)
        .map(|c| (c.status, c.reason.clone()))
}

#[tokio::test]
async fn test_create_reaches_ready_and_records_external_id() {
    let h = Harness::new();
    let obj = h.created().await;

    assert!(obj.has_finalizer(FINALIZER));
    assert_eq!(obj.status.record.phase, Phase::Ready);
    assert_eq!(obj.status.record.external_id.as_deref(), Some("ext-1"));
    assert_eq!(obj.status.observed_generation, Some(1));
    assert!(obj.status.record.spec_hash.is_some());
    assert_eq!(
        condition(&obj, CONDITION_READY),
        Some((ConditionStatus::True, "Created".to_string()))
    );
    assert_eq!(obj.status.observed["id"], json!("ext-1"));
    assert_eq!(obj.status.observed["url"], json!("https://example.test/alerts/ext-1"));

    let creates = h.adapter.calls_of(Op::Create);
    assert_eq!(creates.len(), 1);
    let sent: Vec<&str> = creates[0].attrs.keys().map(String::as_str).collect();
    assert_eq!(sent, vec!["api_token", "condition", "minutes", "name", "tags"]);
}

#[tokio::test]
async fn test_sensitive_values_never_reach_status() {
    let h = Harness::new();
    let obj = h.created().await;

    assert!(!obj.status.observed.contains_key("api_token"));
    let status = serde_json::to_string(&obj.status).unwrap();
    assert!(!status.contains("s3cr3t-token"), "{status}");
    assert!(obj.status.record.applied_digests.contains_key("api_token"));
}

#[tokio::test]
async fn test_status_owned_keys_in_spec_are_not_sent() {
    let h = Harness::new();
    let mut desired = alert_spec(5);
    desired.insert("url".into(), json!("https://user.example/override"));
    desired.insert("id".into(), json!("user-chosen"));
    h.apply(desired);
    h.reconcile().await;

    let create = &h.adapter.calls_of(Op::Create)[0];
    assert!(!create.attrs.contains_key("url"));
    assert!(!create.attrs.contains_key("id"));
    assert_eq!(
        h.object().status.observed["url"],
        json!("https://example.test/alerts/ext-1")
    );
}

#[tokio::test]
async fn test_ready_object_is_read_for_drift() {
    let h = Harness::new();
    h.created().await;

    assert_eq!(h.reconcile().await, Action::Requeue(DRIFT));
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Ready);
    assert_eq!(
        condition(&obj, CONDITION_READY),
        Some((ConditionStatus::True, "InSync".to_string()))
    );
    assert_eq!(h.adapter.calls_of(Op::Read).len(), 1);
    assert!(h.adapter.calls_of(Op::Update).is_empty());
    assert!(condition(&obj, CONDITION_DRIFTED).is_none());
}

#[tokio::test]
async fn test_transient_create_failures_back_off_then_succeed() {
    let h = Harness::new();
    h.adapter.fail_next(Op::Create, PluginError::transient("rate limited"));
    h.adapter.fail_next(Op::Create, PluginError::transient("rate limited"));
    h.apply(alert_spec(5));

    assert_eq!(h.reconcile().await, Action::Requeue(Duration::from_millis(100)));
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Pending);
    assert_eq!(obj.status.record.retry_count, 1);
    assert_eq!(
        condition(&obj, CONDITION_READY),
        Some((ConditionStatus::False, "CreateFailed".to_string()))
    );

    assert_eq!(h.reconcile().await, Action::Requeue(Duration::from_millis(200)));
    assert_eq!(h.object().status.record.retry_count, 2);

    assert_eq!(h.reconcile().await, Action::Requeue(DRIFT));
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Ready);
    assert_eq!(obj.status.record.retry_count, 0);
    assert_eq!(h.adapter.calls_of(Op::Create).len(), 3);
    assert_eq!(h.adapter.resource_count(), 1);
}

#[tokio::test]
async fn test_permanent_failure_stalls_until_spec_changes() {
    let h = Harness::new();
    h.adapter
        .fail_next(Op::Create, PluginError::permanent("condition does not parse"));
    h.apply(alert_spec(5));

    assert_eq!(h.reconcile().await, Action::AwaitChange);
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Pending);
    assert!(obj.status.record.stalled_hash.is_some());
    assert_eq!(
        condition(&obj, CONDITION_STALLED),
        Some((ConditionStatus::True, "CreateFailed".to_string()))
    );

    // Same spec: no provider call at all.
    assert_eq!(h.reconcile().await, Action::AwaitChange);
    assert_eq!(h.adapter.calls().len(), 1);

    h.apply(alert_spec(15));
    assert_eq!(h.reconcile().await, Action::Requeue(DRIFT));
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Ready);
    assert!(obj.status.record.stalled_hash.is_none());
    assert!(condition(&obj, CONDITION_STALLED).is_none());
    assert_eq!(h.adapter.calls_of(Op::Create).len(), 2);
}

#[tokio::test]
async fn test_spec_change_sends_only_changed_attributes() {
    let h = Harness::new();
    h.created().await;

    h.apply(alert_spec(10));
    assert_eq!(h.reconcile().await, Action::Requeue(DRIFT));

    let updates = h.adapter.calls_of(Op::Update);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id.as_deref(), Some("ext-1"));
    assert_eq!(updates[0].attrs, spec(json!({ "minutes": 10 })));

    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Ready);
    assert_eq!(obj.status.observed_generation, Some(2));
    assert_eq!(
        condition(&obj, CONDITION_READY),
        Some((ConditionStatus::True, "Updated".to_string()))
    );
    assert_eq!(h.adapter.resource("ext-1").unwrap()["minutes"], json!(10));
}

#[tokio::test]
async fn test_reordering_a_set_is_not_a_change() {
    let h = Harness::new();
    h.created().await;

    let mut reordered = alert_spec(5);
    reordered.insert("tags".into(), json!(["cpu", "prod"]));
    h.apply(reordered);
    h.reconcile().await;

    assert!(h.adapter.calls_of(Op::Update).is_empty());
    assert_eq!(h.object().status.record.phase, Phase::Ready);
}

#[tokio::test]
async fn test_drift_is_reported_and_spec_reasserted() {
    let h = Harness::new();
    h.created().await;
    h.adapter.tamper("ext-1", "minutes", json!(99));

    assert_eq!(h.reconcile().await, Action::Requeue(DRIFT));
    let updates = h.adapter.calls_of(Op::Update);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].attrs, spec(json!({ "minutes": 5 })));
    assert_eq!(h.adapter.resource("ext-1").unwrap()["minutes"], json!(5));

    let obj = h.object();
    assert_eq!(obj.spec["minutes"], json!(5));
    assert_eq!(obj.status.record.phase, Phase::Ready);
    let drifted = obj.status.record.condition(CONDITION_DRIFTED).unwrap();
    assert_eq!(drifted.status, ConditionStatus::True);
    assert_eq!(drifted.reason, "DriftCorrected");
    assert!(drifted.message.contains("minutes"));

    h.reconcile().await;
    assert_eq!(
        condition(&h.object(), CONDITION_DRIFTED),
        Some((ConditionStatus::False, "InSync".to_string()))
    );
}

#[tokio::test]
async fn test_vanished_resource_is_recreated() {
    let h = Harness::new();
    h.created().await;
    h.adapter.forget("ext-1");

    assert_eq!(h.reconcile().await, Action::Requeue(Duration::ZERO));
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Pending);
    assert!(obj.status.record.external_id.is_none());
    assert!(obj.status.observed.is_empty());

    assert_eq!(h.reconcile().await, Action::Requeue(DRIFT));
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Ready);
    assert_eq!(obj.status.record.external_id.as_deref(), Some("ext-2"));
}

#[tokio::test]
async fn test_deletion_removes_external_resource_then_releases_object() {
    let h = Harness::new();
    h.created().await;
    h.store.request_deletion(&h.key).unwrap();
    assert!(h.object().deletion_requested);

    assert_eq!(h.reconcile().await, Action::AwaitChange);
    let deletes = h.adapter.calls_of(Op::Delete);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].id.as_deref(), Some("ext-1"));
    assert_eq!(h.adapter.resource_count(), 0);
    assert!(h.store.object(&h.key).is_none());
}

#[tokio::test]
async fn test_delete_of_missing_resource_counts_as_deleted() {
    let h = Harness::new();
    h.created().await;
    h.adapter.forget("ext-1");
    h.store.request_deletion(&h.key).unwrap();

    assert_eq!(h.reconcile().await, Action::AwaitChange);
    assert_eq!(h.adapter.calls_of(Op::Delete).len(), 1);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_transient_delete_failure_keeps_finalizer() {
    let h = Harness::new();
    h.created().await;
    h.adapter.fail_next(Op::Delete, PluginError::transient("timeout"));
    h.store.request_deletion(&h.key).unwrap();

    assert_eq!(h.reconcile().await, Action::Requeue(Duration::from_millis(100)));
    let obj = h.object();
    assert_eq!(obj.status.record.phase, Phase::Deleting);
    assert!(obj.has_finalizer(FINALIZER));
    assert_eq!(h.adapter.resource_count(), 1);

    assert_eq!(h.reconcile().await, Action::AwaitChange);
    assert!(h.store.is_empty());
    assert_eq!(h.adapter.resource_count(), 0);
}

#[tokio::test]
async fn test_do_not_terminate_blocks_deletion() {
    let h = Harness::new();
    let mut keep = alert_spec(5);
    keep.insert("terminationPolicy".into(), json!("DoNotTerminate"));
    h.apply(keep);
    h.reconcile().await;
    assert!(!h.adapter.calls_of(Op::Create)[0]
        .attrs
        .contains_key("terminationPolicy"));

    h.store.request_deletion(&h.key).unwrap();
    assert_eq!(h.reconcile().await, Action::AwaitChange);
    let obj = h.object();
    assert_eq!(
        condition(&obj, CONDITION_TERMINATION_BLOCKED),
        Some((ConditionStatus::True, "DoNotTerminate".to_string()))
    );
    assert!(h.adapter.calls_of(Op::Delete).is_empty());
    assert_eq!(h.adapter.resource_count(), 1);

    h.apply(alert_spec(5));
    assert_eq!(h.reconcile().await, Action::AwaitChange);
    assert!(h.store.is_empty());
    assert_eq!(h.adapter.resource_count(), 0);
}

#[tokio::test]
async fn test_unknown_termination_policy_keeps_resource() {
    let h = Harness::new();
    let mut odd = alert_spec(5);
    odd.insert("terminationPolicy".into(), json!("Orphan"));
    h.apply(odd);
    h.reconcile().await;
    h.store.request_deletion(&h.key).unwrap();

    assert_eq!(h.reconcile().await, Action::AwaitChange);
    assert!(h.adapter.calls_of(Op::Delete).is_empty());
    assert!(h.store.object(&h.key).is_some());
}

#[tokio::test]
async fn test_finalizer_removal_is_retried_after_store_failure() {
    let store = Arc::new(FlakyStore::new());
    let adapter = Arc::new(ScriptedAdapter::new());
    let reconciler = Reconciler::new(
        Arc::new(alert_binding()),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&adapter) as Arc<dyn CrudAdapter>,
        &config(),
    );
    let key = ObjectKey::new("Alert", "default", "high-cpu");
    store.inner.apply(key.clone(), alert_spec(5));
    reconciler.reconcile(&key).await.unwrap();

    store.inner.request_deletion(&key).unwrap();
    store.fail_next_finalizer_removal(StoreError::Backend("apiserver unavailable".into()));
    let err = reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Store(StoreError::Backend(_))));
    let obj = store.inner.object(&key).unwrap();
    assert_eq!(obj.status.record.phase, Phase::Deleted);
    assert!(obj.has_finalizer(FINALIZER));
    assert_eq!(adapter.resource_count(), 0);

    assert_eq!(reconciler.reconcile(&key).await.unwrap(), Action::AwaitChange);
    assert!(store.inner.is_empty());
    assert_eq!(adapter.calls_of(Op::Delete).len(), 1);
}

#[tokio::test]
async fn test_cancelled_pass_makes_no_provider_call() {
    let h = Harness::new();
    h.apply(alert_spec(5));
    let cancelled = CancellationToken::new();
    cancelled.cancel();

    let err = h.reconciler.reconcile_until(&h.key, &cancelled).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));
    assert!(h.adapter.calls().is_empty());
    assert_eq!(h.object().status.record.phase, Phase::Pending);

    h.created().await;
    let err = h.reconciler.reconcile_until(&h.key, &cancelled).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));
    assert!(h.adapter.calls_of(Op::Read).is_empty());
    assert_eq!(h.object().status.record.phase, Phase::Ready);
}

#[tokio::test]
async fn test_missing_object_needs_no_work() {
    let h = Harness::new();
    assert_eq!(h.reconcile().await, Action::AwaitChange);
    assert!(h.adapter.calls().is_empty());
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

type Running = (watch::Sender<bool>, JoinHandle<Result<(), ReconcileError>>);

fn start(
    store: &Arc<InMemoryStore>,
    adapter: &Arc<ScriptedAdapter>,
    config: ReconcilerConfig,
) -> Running {
    let controller = Controller::new(
        alert_binding(),
        Arc::clone(store) as Arc<dyn ObjectStore>,
        Arc::clone(adapter) as Arc<dyn CrudAdapter>,
        config,
    );
    let (stop, shutdown) = watch::channel(false);
    (stop, tokio::spawn(controller.run(shutdown)))
}

async fn shut_down((stop, handle): Running) {
    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("controller stops")
        .expect("controller task")
        .expect("controller result");
}

fn applied(store: &InMemoryStore, key: &ObjectKey, generation: i64) -> bool {
    store.object(key).is_some_and(|o| {
        o.status.record.phase == Phase::Ready && o.status.observed_generation == Some(generation)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spec_edit_during_create_keeps_one_external_resource() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.set_latency(Op::Create, Duration::from_millis(300));
    let key = ObjectKey::new("Alert", "default", "cpu");
    store.apply(key.clone(), alert_spec(5));
    let running = start(&store, &adapter, config());

    eventually("create sent", || adapter.calls_of(Op::Create).len() == 1).await;
    let edited = store.apply(key.clone(), alert_spec(10));
    eventually("edit applied", || applied(&store, &key, edited.generation)).await;

    assert_eq!(adapter.calls_of(Op::Create).len(), 1);
    assert_eq!(adapter.resource_count(), 1);
    let obj = store.object(&key).unwrap();
    assert_eq!(obj.status.record.external_id.as_deref(), Some("ext-1"));
    assert_eq!(adapter.resource("ext-1").unwrap()["minutes"], json!(10));
    shut_down(running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_controller_runs_one_pass_per_object_at_a_time() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.set_latency(Op::Update, Duration::from_millis(30));
    adapter.set_latency(Op::Read, Duration::from_millis(30));
    let key = ObjectKey::new("Alert", "default", "cpu");
    let mut cfg = config();
    cfg.workers = 4;
    let running = start(&store, &adapter, cfg);

    let first = store.apply(key.clone(), alert_spec(5));
    eventually("alert ready", || applied(&store, &key, first.generation)).await;

    let mut last = first;
    for minutes in 6..16 {
        last = store.apply(key.clone(), alert_spec(minutes));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    eventually("last edit applied", || applied(&store, &key, last.generation)).await;

    assert_eq!(adapter.max_concurrent(), 1);
    assert_eq!(adapter.resource_count(), 1);
    assert_eq!(adapter.resource("ext-1").unwrap()["minutes"], json!(15));
    shut_down(running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repeated_edits_keep_a_single_drift_schedule() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = Arc::new(ScriptedAdapter::new());
    let key = ObjectKey::new("Alert", "default", "cpu");
    let mut cfg = config();
    cfg.drift_interval = Duration::from_millis(200);
    let running = start(&store, &adapter, cfg);

    for minutes in 5..13 {
        let obj = store.apply(key.clone(), alert_spec(minutes));
        eventually("edit applied", || applied(&store, &key, obj.generation)).await;
    }

    let before = adapter.calls_of(Op::Read).len();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let reads = adapter.calls_of(Op::Read).len() - before;
    // one drift check every 200ms
    assert!((1..=7).contains(&reads), "{reads} drift reads in 1s");
    shut_down(running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_controller_reconciles_until_shutdown() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.fail_next(Op::Create, PluginError::transient("warming up"));

    let cpu = ObjectKey::new("Alert", "default", "cpu");
    let disk = ObjectKey::new("Alert", "default", "disk");
    store.apply(cpu.clone(), alert_spec(5));

    let controller = Controller::new(
        alert_binding(),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&adapter) as Arc<dyn CrudAdapter>,
        config(),
    );
    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(controller.run(shutdown));

    store.apply(disk.clone(), alert_spec(30));
    let ready = |key: &ObjectKey| {
        store
            .object(key)
            .is_some_and(|o| o.status.record.phase == Phase::Ready)
    };
    eventually("both alerts ready", || ready(&cpu) && ready(&disk)).await;
    assert_eq!(adapter.resource_count(), 2);

    store.request_deletion(&disk).unwrap();
    eventually("disk alert released", || store.object(&disk).is_none()).await;
    assert_eq!(adapter.resource_count(), 1);
    assert!(store.object(&cpu).is_some());

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("controller stops")
        .expect("controller task")
        .expect("controller result");
}
