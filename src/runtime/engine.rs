use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::adapter::{Attributes, CrudAdapter};
use super::backoff::Backoff;
use super::binding::ResourceBinding;
use super::diff;
use super::error::{PluginError, ReconcileError, StoreError};
use super::phase::{Phase, TerminationPolicy};
use super::record::{
    ConditionStatus, ObjectStatus, CONDITION_DRIFTED, CONDITION_READY, CONDITION_STALLED,
    CONDITION_TERMINATION_BLOCKED,
};
use super::store::{ManagedObject, ObjectKey, ObjectStore, FINALIZER};
use crate::config::ReconcilerConfig;

/// Spec key carrying the termination policy
pub const TERMINATION_POLICY_KEY: &str = "terminationPolicy";

const SAVE_ATTEMPTS: usize = 3;

/// What the controller should do with an object after a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Run another pass after the delay
    Requeue(Duration),
    /// Nothing to do until the object changes
    AwaitChange,
}

impl Action {
    /// Requeue after `delay`
    pub fn requeue(delay: Duration) -> Self {
        Action::Requeue(delay)
    }

    /// Wait for the next change notification
    pub fn await_change() -> Self {
        Action::AwaitChange
    }
}

// State carried through one pass.
struct Pass {
    key: ObjectKey,
    generation: i64,
    resource_version: u64,
    status: ObjectStatus,
    hash: String,
    cancel: CancellationToken,
}

/// The reconciliation state machine for one kind.
///
/// A pass reads the object, decides on exactly one provider operation
/// (create, update, read for drift, or delete), records the outcome in the
/// object's Status and returns when to look at the object again. Provider
/// failures never escape a pass: transient ones become a backoff requeue
/// with the phase unchanged, permanent ones a `Stalled` condition that
/// holds until the spec changes.
///
/// Cancellation is only honoured before a mutating provider call or during
/// a drift read. Once a create, update or delete is sent the pass runs
/// until its outcome is persisted, so an external resource is never left
/// without a record pointing at it.
pub struct Reconciler {
    binding: Arc<ResourceBinding>,
    store: Arc<dyn ObjectStore>,
    adapter: Arc<dyn CrudAdapter>,
    backoff: Backoff,
    drift_interval: Duration,
}

impl Reconciler {
    /// Create a reconciler for the kind described by `binding`
    pub fn new(
        binding: Arc<ResourceBinding>,
        store: Arc<dyn ObjectStore>,
        adapter: Arc<dyn CrudAdapter>,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            binding,
            store,
            adapter,
            backoff: config.backoff(),
            drift_interval: config.drift_interval,
        }
    }

    /// The binding this reconciler applies
    pub fn binding(&self) -> &ResourceBinding {
        &self.binding
    }

    /// Run one reconciliation pass for `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        self.reconcile_until(key, &CancellationToken::new()).await
    }

    /// Run one pass for `key` that stops early with
    /// [`ReconcileError::Cancelled`] once `cancel` fires, provided no
    /// provider mutation is outstanding.
    pub async fn reconcile_until(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError> {
        let Some(mut obj) = self.store.get(key).await? else {
            debug!(kind = %key.kind, name = %key.name, "Object is gone, nothing to reconcile");
            return Ok(Action::await_change());
        };

        let desired = self.desired(&obj.spec);
        let digests = diff::digests(&self.binding, &desired);
        let hash = diff::spec_hash(&digests);

        if obj.deletion_requested {
            return self.finalize(obj, hash, cancel.clone()).await;
        }

        if !obj.has_finalizer(FINALIZER) {
            obj.resource_version = self
                .store
                .add_finalizer(key, obj.resource_version, FINALIZER)
                .await?;
            obj.finalizers.push(FINALIZER.to_string());
        }

        let mut pass = Pass {
            key: key.clone(),
            generation: obj.generation,
            resource_version: obj.resource_version,
            status: obj.status,
            hash,
            cancel: cancel.clone(),
        };

        if let Some(stalled) = pass.status.record.stalled_hash.clone() {
            if stalled == pass.hash {
                debug!(kind = %key.kind, name = %key.name, "Spec unchanged since permanent failure");
                return Ok(Action::await_change());
            }
            info!(kind = %key.kind, name = %key.name, "Spec changed, clearing stalled state");
            pass.status.record.stalled_hash = None;
            pass.status.record.retry_count = 0;
            pass.status.record.clear_condition(CONDITION_STALLED);
        }

        match pass.status.record.external_id.clone() {
            None => self.create(pass, desired, digests).await,
            Some(id) if pass.status.record.spec_hash.as_deref() != Some(pass.hash.as_str()) => {
                self.update(pass, &id, desired, digests).await
            }
            Some(id) => self.check_drift(pass, &id, desired).await,
        }
    }

    async fn create(
        &self,
        mut pass: Pass,
        desired: Attributes,
        digests: BTreeMap<String, String>,
    ) -> Result<Action, ReconcileError> {
        self.checkpoint(&pass)?;
        if !matches!(pass.status.record.phase, Phase::Pending | Phase::Creating) {
            self.transition(&mut pass, Phase::Pending)?;
        }
        self.transition(&mut pass, Phase::Creating)?;
        pass.status
            .record
            .set_condition(CONDITION_READY, ConditionStatus::False, "Creating", "");
        self.save(&mut pass).await?;

        match self.adapter.create(&self.binding.resource_type, &desired).await {
            Ok(created) => {
                info!(
                    kind = %pass.key.kind,
                    name = %pass.key.name,
                    external_id = %created.id,
                    "External resource created"
                );
                pass.status.record.external_id = Some(created.id);
                pass.status.observed = self.observed(&created.observed);
                self.applied(&mut pass, digests, "Created")?;
                self.save(&mut pass).await?;
                Ok(Action::requeue(self.drift_interval))
            }
            Err(err) => self.fail(pass, err, Phase::Pending, "CreateFailed").await,
        }
    }

    async fn update(
        &self,
        mut pass: Pass,
        id: &str,
        desired: Attributes,
        digests: BTreeMap<String, String>,
    ) -> Result<Action, ReconcileError> {
        let changed: Attributes = desired
            .iter()
            .filter(|(k, _)| pass.status.record.applied_digests.get(*k) != digests.get(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.checkpoint(&pass)?;
        self.transition(&mut pass, Phase::Updating)?;
        self.save(&mut pass).await?;
        debug!(
            kind = %pass.key.kind,
            name = %pass.key.name,
            changed = ?changed.keys().collect::<Vec<_>>(),
            "Updating external resource"
        );

        let state = match self
            .adapter
            .update(&self.binding.resource_type, id, &changed)
            .await
        {
            Ok(state) => state,
            Err(PluginError::NotFound) => return self.vanished(pass).await,
            Err(err) => return self.fail(pass, err, Phase::Ready, "UpdateFailed").await,
        };

        // Status reflects what the provider reports after the update.
        let state = match self.adapter.read(&self.binding.resource_type, id).await {
            Ok(Some(read)) => read,
            Ok(None) | Err(PluginError::NotFound) => return self.vanished(pass).await,
            Err(err) => {
                warn!(
                    kind = %pass.key.kind,
                    name = %pass.key.name,
                    error = %err,
                    "Read after update failed, using update result"
                );
                state
            }
        };

        pass.status.observed = self.observed(&state);
        self.applied(&mut pass, digests, "Updated")?;
        info!(kind = %pass.key.kind, name = %pass.key.name, "External resource updated");
        self.save(&mut pass).await?;
        Ok(Action::requeue(self.drift_interval))
    }

    async fn check_drift(
        &self,
        mut pass: Pass,
        id: &str,
        desired: Attributes,
    ) -> Result<Action, ReconcileError> {
        let read = tokio::select! {
            biased;
            _ = pass.cancel.cancelled() => return Err(ReconcileError::Cancelled),
            read = self.adapter.read(&self.binding.resource_type, id) => read,
        };
        let observed = match read {
            Ok(Some(observed)) => observed,
            Ok(None) | Err(PluginError::NotFound) => return self.vanished(pass).await,
            Err(err) => return self.fail(pass, err, Phase::Ready, "ReadFailed").await,
        };

        let drifted: Attributes = desired
            .iter()
            .filter(|(key, want)| match observed.get(*key) {
                Some(have) => !diff::values_equal(have, want, diff::is_set(&self.binding, key)),
                // write-only secrets are commonly not returned on read
                None => !self.binding.by_key(key).is_some_and(|f| f.sensitive),
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        pass.status.observed = self.observed(&observed);
        pass.status.observed_generation = Some(pass.generation);

        if drifted.is_empty() {
            if pass.status.record.condition(CONDITION_DRIFTED).is_some() {
                pass.status
                    .record
                    .set_condition(CONDITION_DRIFTED, ConditionStatus::False, "InSync", "");
            }
            pass.status.record.retry_count = 0;
            pass.status
                .record
                .set_condition(CONDITION_READY, ConditionStatus::True, "InSync", "");
            self.transition(&mut pass, Phase::Ready)?;
            self.save(&mut pass).await?;
            return Ok(Action::requeue(self.drift_interval));
        }

        self.checkpoint(&pass)?;
        let keys: Vec<&str> = drifted.keys().map(String::as_str).collect();
        let message = format!("drifted attributes: {}", keys.join(", "));
        warn!(kind = %pass.key.kind, name = %pass.key.name, drifted = ?keys, "Drift detected, re-asserting spec");
        pass.status.record.set_condition(
            CONDITION_DRIFTED,
            ConditionStatus::True,
            "DriftDetected",
            message.clone(),
        );
        self.transition(&mut pass, Phase::Updating)?;

        match self
            .adapter
            .update(&self.binding.resource_type, id, &drifted)
            .await
        {
            Ok(state) => {
                pass.status.observed = self.observed(&state);
                pass.status.record.retry_count = 0;
                pass.status.record.set_condition(
                    CONDITION_DRIFTED,
                    ConditionStatus::True,
                    "DriftCorrected",
                    message,
                );
                pass.status
                    .record
                    .set_condition(CONDITION_READY, ConditionStatus::True, "DriftCorrected", "");
                self.transition(&mut pass, Phase::Ready)?;
                self.save(&mut pass).await?;
                Ok(Action::requeue(self.drift_interval))
            }
            Err(PluginError::NotFound) => self.vanished(pass).await,
            Err(err) => self.fail(pass, err, Phase::Ready, "DriftCorrectionFailed").await,
        }
    }

    async fn finalize(
        &self,
        obj: ManagedObject,
        hash: String,
        cancel: CancellationToken,
    ) -> Result<Action, ReconcileError> {
        if !obj.has_finalizer(FINALIZER) {
            return Ok(Action::await_change());
        }
        let policy = termination_policy(&obj);
        let mut pass = Pass {
            key: obj.key,
            generation: obj.generation,
            resource_version: obj.resource_version,
            status: obj.status,
            hash,
            cancel,
        };

        // A previous pass deleted the external resource but could not
        // release the object.
        if pass.status.record.phase == Phase::Deleted {
            debug!(kind = %pass.key.kind, name = %pass.key.name, "Retrying finalizer removal");
            return self.release(&pass.key).await;
        }

        if policy == TerminationPolicy::DoNotTerminate {
            warn!(
                kind = %pass.key.kind,
                name = %pass.key.name,
                "Deletion blocked by terminationPolicy DoNotTerminate"
            );
            pass.status.record.set_condition(
                CONDITION_TERMINATION_BLOCKED,
                ConditionStatus::True,
                "DoNotTerminate",
                "terminationPolicy is DoNotTerminate; set it to Delete to release the object",
            );
            self.save(&mut pass).await?;
            return Ok(Action::await_change());
        }
        pass.status.record.clear_condition(CONDITION_TERMINATION_BLOCKED);

        self.checkpoint(&pass)?;
        self.transition(&mut pass, Phase::Deleting)?;
        pass.status
            .record
            .set_condition(CONDITION_READY, ConditionStatus::False, "Deleting", "");
        self.save(&mut pass).await?;

        if let Some(id) = pass.status.record.external_id.clone() {
            match self.adapter.delete(&self.binding.resource_type, &id).await {
                Ok(()) => {}
                Err(PluginError::NotFound) => {
                    debug!(kind = %pass.key.kind, name = %pass.key.name, "External resource already gone");
                }
                Err(err) => return self.fail(pass, err, Phase::Deleting, "DeleteFailed").await,
            }
        }

        self.transition(&mut pass, Phase::Deleted)?;
        pass.status.record.external_id = None;
        pass.status.record.retry_count = 0;
        pass.status.observed.clear();
        self.save(&mut pass).await?;
        self.release(&pass.key).await
    }

    async fn release(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        match self.store.remove_finalizer(key, FINALIZER).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        info!(kind = %key.kind, name = %key.name, "External resource deleted, object released");
        Ok(Action::await_change())
    }

    async fn vanished(&self, mut pass: Pass) -> Result<Action, ReconcileError> {
        warn!(
            kind = %pass.key.kind,
            name = %pass.key.name,
            "External resource disappeared, will recreate"
        );
        pass.status.record.external_id = None;
        pass.status.record.spec_hash = None;
        pass.status.record.applied_digests.clear();
        pass.status.observed.clear();
        self.transition(&mut pass, Phase::Pending)?;
        pass.status.record.set_condition(
            CONDITION_READY,
            ConditionStatus::False,
            "ExternalResourceMissing",
            "the provider no longer reports the resource",
        );
        self.save(&mut pass).await?;
        Ok(Action::requeue(Duration::ZERO))
    }

    async fn fail(
        &self,
        mut pass: Pass,
        err: PluginError,
        phase: Phase,
        reason: &str,
    ) -> Result<Action, ReconcileError> {
        self.transition(&mut pass, phase)?;
        let action = match &err {
            PluginError::Permanent(msg) => {
                error!(
                    kind = %pass.key.kind,
                    name = %pass.key.name,
                    reason = %reason,
                    error = %msg,
                    "Permanent provider error, stalling until the spec changes"
                );
                pass.status.record.stalled_hash = Some(pass.hash.clone());
                pass.status
                    .record
                    .set_condition(CONDITION_STALLED, ConditionStatus::True, reason, msg.clone());
                Action::await_change()
            }
            PluginError::Transient(_) | PluginError::NotFound => {
                pass.status.record.retry_count = pass.status.record.retry_count.saturating_add(1);
                let attempt = pass.status.record.retry_count;
                let delay = self.backoff.delay(attempt);
                warn!(
                    kind = %pass.key.kind,
                    name = %pass.key.name,
                    phase = %phase,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Provider call failed, retrying"
                );
                Action::requeue(delay)
            }
        };
        if phase != Phase::Deleting {
            pass.status
                .record
                .set_condition(CONDITION_READY, ConditionStatus::False, reason, err.to_string());
        }
        self.save(&mut pass).await?;
        Ok(action)
    }

    // Record a successful apply of the desired spec.
    fn applied(
        &self,
        pass: &mut Pass,
        digests: BTreeMap<String, String>,
        reason: &str,
    ) -> Result<(), ReconcileError> {
        pass.status.record.spec_hash = Some(pass.hash.clone());
        pass.status.record.applied_digests = digests;
        pass.status.record.retry_count = 0;
        pass.status.observed_generation = Some(pass.generation);
        pass.status
            .record
            .set_condition(CONDITION_READY, ConditionStatus::True, reason, "");
        self.transition(pass, Phase::Ready)
    }

    fn checkpoint(&self, pass: &Pass) -> Result<(), ReconcileError> {
        if pass.cancel.is_cancelled() {
            debug!(kind = %pass.key.kind, name = %pass.key.name, "Pass cancelled before provider call");
            return Err(ReconcileError::Cancelled);
        }
        Ok(())
    }

    fn transition(&self, pass: &mut Pass, next: Phase) -> Result<(), ReconcileError> {
        let from = pass.status.record.phase;
        if !from.can_transition_to(next) {
            error!(kind = %pass.key.kind, name = %pass.key.name, from = %from, to = %next, "Invalid phase transition");
            return Err(ReconcileError::InvalidTransition { from, to: next });
        }
        if from != next {
            info!(kind = %pass.key.kind, name = %pass.key.name, from = %from, to = %next, "Phase transition");
        }
        pass.status.record.phase = next;
        Ok(())
    }

    async fn save(&self, pass: &mut Pass) -> Result<(), ReconcileError> {
        for _ in 0..SAVE_ATTEMPTS {
            match self
                .store
                .update_status(&pass.key, pass.resource_version, pass.status.clone())
                .await
            {
                Ok(rv) => {
                    pass.resource_version = rv;
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) => {
                    // Status belongs to this controller; a newer version only
                    // means spec or metadata moved, which the next pass handles.
                    let current = self
                        .store
                        .get(&pass.key)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(pass.key.to_string()))?;
                    pass.resource_version = current.resource_version;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Conflict(pass.key.to_string()).into())
    }

    // Spec-owned attributes present in the spec, keyed by provider name.
    fn desired(&self, spec: &Map<String, Value>) -> Attributes {
        self.binding
            .spec_fields()
            .filter_map(|f| {
                spec.get(&f.key)
                    .filter(|v| !v.is_null())
                    .map(|v| (f.key.clone(), v.clone()))
            })
            .collect()
    }

    // Non-sensitive computed attributes reported by the provider.
    fn observed(&self, state: &Attributes) -> Map<String, Value> {
        self.binding
            .fields
            .iter()
            .filter(|f| f.is_observed())
            .filter_map(|f| state.get(&f.key).map(|v| (f.key.clone(), v.clone())))
            .collect()
    }
}

fn termination_policy(obj: &ManagedObject) -> TerminationPolicy {
    match obj.spec.get(TERMINATION_POLICY_KEY) {
        None | Some(Value::Null) => TerminationPolicy::default(),
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|_| {
            warn!(
                kind = %obj.key.kind,
                name = %obj.key.name,
                value = %value,
                "Unknown terminationPolicy, keeping the external resource"
            );
            TerminationPolicy::DoNotTerminate
        }),
    }
}
