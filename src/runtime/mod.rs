//! # Reconciliation Runtime
//!
//! The state machine generated controllers execute. Each managed object is a
//! durable proxy for one external resource: the runtime creates, updates,
//! drift-checks and deletes that resource through a [`CrudAdapter`] and
//! records what happened in the object's Status.
//!
//! ## Phases
//!
//! ```text
//! Pending → Creating → Ready → Updating → Ready
//! any → Deleting → Deleted
//! ```
//!
//! - **Create**: no external ID is recorded. The spec attributes are sent
//!   keyed by provider name; the returned ID is stored.
//! - **Update**: the spec hash differs from the last applied hash. Only the
//!   attributes whose digests changed are sent; Status-owned attributes and
//!   attributes absent from the spec never are.
//! - **Drift check**: a Ready object is re-read every drift interval.
//!   Divergence is recorded as a `Drifted` condition and the spec is
//!   re-asserted; observed values are never copied into the spec.
//! - **Delete**: guarded by a finalizer. "Not found" counts as deleted, and
//!   the object is released only after the provider confirms.
//!
//! ## Failures
//!
//! [`PluginError::Transient`] keeps the phase and retries with exponential
//! backoff. [`PluginError::Permanent`] sets a `Stalled` condition and stops
//! retrying until the spec hash changes.
//!
//! ## Cancellation
//!
//! A change to an object cancels its in-flight pass, but only up to the
//! next provider mutation: once a create, update or delete is sent, its
//! outcome is recorded before the pass stops.
//!
//! ## Sensitive attributes
//!
//! Values of sensitive attributes are sent to the provider but never written
//! to Status; only their digests are kept.

mod adapter;
mod backoff;
mod binding;
mod controller;
pub mod diff;
mod engine;
mod error;
mod phase;
mod queue;
mod record;
mod store;

pub use adapter::{Attributes, Created, CrudAdapter};
pub use backoff::Backoff;
pub use binding::{FieldBinding, FieldOwner, ResourceBinding};
pub use controller::Controller;
pub use engine::{Action, Reconciler, TERMINATION_POLICY_KEY};
pub use error::{PluginError, ReconcileError, StoreError};
pub use phase::{Phase, TerminationPolicy};
pub use queue::WorkQueue;
pub use record::{
    Condition, ConditionStatus, ObjectStatus, ReconciliationRecord, CONDITION_DRIFTED,
    CONDITION_READY, CONDITION_STALLED, CONDITION_TERMINATION_BLOCKED,
};
pub use store::{InMemoryStore, ManagedObject, ObjectKey, ObjectStore, WatchEvent, FINALIZER};
