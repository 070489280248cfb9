//! # Emit Module
//!
//! Writes rendered artifacts to disk.
//!
//! Generated content always lives between a pair of marker comments:
//!
//! ```text
//! // @kubeform:generated:begin
//! ...generated code...
//! // @kubeform:generated:end
//! ```
//!
//! (`#` comments for YAML manifests). On regeneration only the region between
//! the markers is replaced; anything a user added above or below survives.
//! A file at a target path without markers is treated as user-owned and
//! blocks the run unless `force` is set.
//!
//! Each kind's API module, controller module and CRD manifest form one
//! [`ArtifactUnit`]. A unit is staged in temporary files next to its targets
//! and renamed into place; a failed rename rolls back the renames already
//! made for that unit. Registry listings are written after every unit.

mod markers;
mod writer;

pub use markers::{comment_leader, merge, wrap, BEGIN_MARKER, END_MARKER};
pub use writer::{Artifact, ArtifactSet, ArtifactUnit, EmissionWriter, WriteReport};
