use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a managed resource.
///
/// ```text
/// Pending → Creating → Ready ⇄ Updating
///    └──────────┴────────┴────────┴──→ Deleting → Deleted
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// No external resource exists yet
    #[default]
    Pending,
    /// A create call is in flight
    Creating,
    /// External resource matches the last applied spec
    Ready,
    /// An update call is in flight
    Updating,
    /// Deletion was requested; the external resource is being removed
    Deleting,
    /// External resource is gone (terminal)
    Deleted,
}

impl Phase {
    /// Whether the FSM allows moving from `self` to `next`.
    ///
    /// Staying in the same phase is always allowed (a failed attempt keeps
    /// the logical phase).
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        if self == next {
            return self != Deleted;
        }
        match (self, next) {
            (Deleted, _) => false,
            (_, Deleting) => true,
            (Deleting, Deleted) => true,
            (Pending, Creating) => true,
            // a failed create leaves the object pending
            (Creating, Ready) | (Creating, Pending) => true,
            (Ready, Updating) => true,
            (Updating, Ready) => true,
            // the external resource disappeared; recreate it
            (Ready, Pending) | (Updating, Pending) => true,
            _ => false,
        }
    }

    /// Whether the phase is terminal
    pub fn is_terminal(self) -> bool {
        self == Phase::Deleted
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Pending => "Pending",
            Phase::Creating => "Creating",
            Phase::Ready => "Ready",
            Phase::Updating => "Updating",
            Phase::Deleting => "Deleting",
            Phase::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// Whether deleting the object deletes the external resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationPolicy {
    /// Delete the external resource, then release the object
    #[default]
    Delete,
    /// Keep the finalizer and the external resource until the policy changes
    DoNotTerminate,
}
