//! # Generator Module
//!
//! Turns a loaded [`ProviderSchema`](crate::schema::ProviderSchema) into the
//! source of a Kubernetes API crate and a controller crate.
//!
//! ## Overview
//!
//! For every provider resource type the generator produces:
//! - **API module** - a `kube::CustomResource` Spec/Status pair plus nested
//!   block types
//! - **Controller module** - a field binding table and a `run` helper wiring
//!   it into [`runtime::Controller`](crate::runtime::Controller)
//! - **CRD manifest** - `CustomResourceDefinition` YAML with an OpenAPI v3
//!   schema derived from the same type mappings
//!
//! plus the registries: `apis/<version>/mod.rs`, the shared
//! `apis/<version>/common.rs`, and `controllers/mod.rs`.
//!
//! ## Architecture
//!
//! ```text
//! ProviderSchema → TypeMapper → synthesize_apis → synthesize_controller → EmissionWriter
//! ```
//!
//! Synthesis is pure and runs for every kind before anything is written, so
//! a failure on one resource leaves the output tree untouched.
//!
//! ## Spec / Status partition
//!
//! | Attribute flags        | Spec | Status | Owner  |
//! |------------------------|------|--------|--------|
//! | required / optional    | yes  | no     | Spec   |
//! | optional + computed    | yes  | yes    | Spec   |
//! | computed only          | no   | yes    | Status |
//! | computed + sensitive   | no   | no     | Status |
//!
//! Sensitive computed attributes stay in the binding table so the runtime
//! knows they exist, but their values are never written to Status.
//!
//! ## Generated Layout
//!
//! ```text
//! provider-<name>-api/
//! ├── crds/
//! │   └── <group>_<plural>.yaml
//! └── src/apis/<version>/
//!     ├── mod.rs        # registry: modules, KINDS, crds()
//!     ├── common.rs     # Phase, TerminationPolicy, Condition
//!     └── <kind>.rs
//! provider-<name>-controller/
//! └── src/controllers/
//!     ├── mod.rs        # registry: bindings()
//!     └── <kind>.rs
//! ```
//!
//! ## Templates
//!
//! Rust sources are rendered with Askama from `templates/`:
//!
//! - `api.rs.txt` - one kind's Spec/Status/nested types
//! - `common.rs.txt` - shared status types
//! - `apis_mod.rs.txt` - API registry
//! - `controller.rs.txt` - one kind's controller
//! - `controllers_mod.rs.txt` - controller registry
//!
//! CRD manifests are built as JSON values and serialized with `serde_yaml`.

mod api;
mod controller;
mod crd;
mod project;
mod templates;

pub use api::{
    kind_entries, synthesize_api, synthesize_apis, ApiSet, GeneratedApi, STATUS_RESERVED_KEYS,
};
pub use controller::{render_controllers_mod, synthesize_controller, GeneratedController};
pub use crd::{crd_manifest, render_crd};
pub use project::{generate, generate_from_file, synthesize, Generation};
pub use templates::{FieldView, KindEntry, StructView};
