use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::phase::Phase;

/// Condition type reporting whether the external resource matches the spec
pub const CONDITION_READY: &str = "Ready";
/// Condition type set when observed state diverged from the spec
pub const CONDITION_DRIFTED: &str = "Drifted";
/// Condition type set after a permanent provider error
pub const CONDITION_STALLED: &str = "Stalled";
/// Condition type set while `DoNotTerminate` holds a deletion
pub const CONDITION_TERMINATION_BLOCKED: &str = "TerminationBlocked";

/// Status of a condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Not known yet
    Unknown,
}

/// A single observation about the object's state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Type of condition (e.g., Ready, Drifted)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Controller bookkeeping persisted inside an object's Status.
///
/// Created on the first successful create and rewritten on every pass; it
/// goes away with the object once the external resource is confirmed gone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRecord {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: Phase,
    /// Latest observations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Identifier the provider assigned on create
    #[serde(rename = "externalID", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Hash of the last successfully applied spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    /// Attribute key → digest of the value last applied
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub applied_digests: BTreeMap<String, String>,
    /// Consecutive failed attempts of the current operation
    #[serde(default)]
    pub retry_count: u32,
    /// Spec hash that hit a permanent provider error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stalled_hash: Option<String>,
}

impl ReconciliationRecord {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace a condition.
    ///
    /// The transition time is kept when the status does not change.
    pub fn set_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        let mut next = Condition::new(type_, status, reason, message);
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status == status {
                next.last_transition_time = existing.last_transition_time;
            }
            *existing = next;
        } else {
            self.conditions.push(next);
        }
    }

    /// Drop a condition if present
    pub fn clear_condition(&mut self, type_: &str) {
        self.conditions.retain(|c| c.type_ != type_);
    }
}

/// Full Status of a managed object: bookkeeping plus observed attributes.
///
/// Observed provider values are flattened next to the bookkeeping fields,
/// keyed by their provider attribute names, matching the generated Status
/// types.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStatus {
    /// Generation of the spec last reconciled
    #[serde(rename = "observedGeneration", default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Controller bookkeeping
    #[serde(flatten)]
    pub record: ReconciliationRecord,
    /// Last observed non-sensitive computed attributes
    #[serde(flatten)]
    pub observed: Map<String, Value>,
}
