//! # kubeform
//!
//! **kubeform** turns an infrastructure provider's resource schema into
//! Kubernetes custom resources: a typed API per resource, its
//! `CustomResourceDefinition`, and a reconciliation controller that keeps the
//! external resource in line with the object's spec.
//!
//! ## Overview
//!
//! A provider (e.g. a Terraform provider) describes every resource type it
//! manages as a tree of attributes. kubeform maps that tree onto a
//! Spec/Status pair, where user-settable attributes go to the Spec and
//! provider-computed ones to the Status. It then generates a controller whose
//! field binding table tells the runtime which Spec keys to send to the
//! provider and which observed values to report back.
//!
//! ## Architecture
//!
//! - **[`schema`]** - Provider schema model and descriptor loader
//! - **[`mapper`]** - Attribute → Rust field type mapping
//! - **[`generator`]** - API, CRD and controller synthesis; the generation pipeline
//! - **[`emit`]** - Marker-preserving, atomic artifact writer
//! - **[`runtime`]** - Reconciliation engine generated controllers run on
//! - **[`config`]** - Generator options, `kubeform.toml`, runtime tuning
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `kubeform-gen` command line
//!
//! ### Generation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant User
//!     participant CLI as CLI<br/>(kubeform-gen)
//!     participant Schema as schema::load_file
//!     participant Api as generator::synthesize_apis
//!     participant Ctrl as generator::synthesize_controller
//!     participant Emit as emit::EmissionWriter
//!     participant FS as File System
//!
//!     User->>CLI: kubeform-gen generate --schema schema.json
//!     CLI->>Schema: load_file(path, provider)
//!     Schema-->>CLI: ProviderSchema
//!     CLI->>Api: synthesize_apis(&schema, &options)
//!     Api->>Api: TypeMapper per resource,<br/>render api.rs + CRD
//!     Api-->>CLI: ApiSet
//!     CLI->>Ctrl: synthesize_controller(&api) per kind
//!     Ctrl-->>CLI: GeneratedController
//!     CLI->>Emit: write(&ArtifactSet)
//!     Emit->>FS: stage + rename per kind, then registries
//!     Emit-->>User: WriteReport
//! ```
//!
//! ### Reconciliation
//!
//! ```text
//! ObjectStore watch ──▶ WorkQueue ──▶ worker ──▶ Reconciler::reconcile
//!                                                   │
//!                                    CrudAdapter ◀──┴──▶ ObjectStore::update_status
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kubeform::config::GeneratorOptions;
//! use kubeform::generator::generate_from_file;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), kubeform::error::GenerateError> {
//! let options = GeneratorOptions::new("wavefront", Path::new("generated"));
//! let report = generate_from_file(Path::new("schema.json"), &options)?;
//! println!("{} files written", report.changed());
//! # Ok(())
//! # }
//! ```
//!
//! Running a generated controller against the in-memory store:
//!
//! ```rust,ignore
//! use kubeform::config::ReconcilerConfig;
//! use kubeform::runtime::{Controller, InMemoryStore};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let (stop, shutdown) = tokio::sync::watch::channel(false);
//! let controller = Controller::new(alert::binding(), store, adapter, ReconcilerConfig::from_env());
//! tokio::spawn(controller.run(shutdown));
//! ```

pub mod cli;
pub mod config;
pub mod emit;
pub mod error;
pub mod generator;
pub mod logging;
pub mod mapper;
pub mod runtime;
pub mod schema;

pub use error::{GenerateError, Result};
