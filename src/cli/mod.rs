//! # CLI Module
//!
//! Command-line interface of the `kubeform-gen` binary.
//!
//! ## Commands
//!
//! ### `generate`
//!
//! Generate API modules, CRD manifests and controllers for a provider:
//!
//! ```bash
//! kubeform-gen generate --schema schema.json --provider wavefront
//! ```
//!
//! Options:
//! - `--schema <FILE>` - Provider schema descriptor (required)
//! - `--provider <NAME>` - API group prefix; defaults to the descriptor's provider
//! - `--provider-original <NAME>` - Provider entry to read from the descriptor
//! - `--version <VERSION>` - API version (default: `v1alpha1`)
//! - `--apis-path`, `--controller-path`, `--crds-path <DIR>` - Output directories
//! - `--config <FILE>` - Configuration file (default: `kubeform.toml` beside the schema)
//! - `--numeric-policy <lossless|float64>` - Number representation
//! - `--force` - Overwrite files that carry no generated markers
//! - `--dry-run` - Report what would change without writing
//!
//! Omitted output directories default to
//! `$KUBEFORM_OUTPUT_ROOT/provider-<name>-api/src/apis/<version>`,
//! `$KUBEFORM_OUTPUT_ROOT/provider-<name>-controller/src/controllers` and
//! `$KUBEFORM_OUTPUT_ROOT/provider-<name>-api/crds`.
//!
//! ### `inspect`
//!
//! ```bash
//! kubeform-gen inspect --schema schema.json [--json]
//! ```
//!
//! Any fatal error is logged and the process exits with a non-zero status.

mod commands;


pub use commands::{inspect, run_cli, run_generate, Cli, Commands, GenerateArgs, InspectEntry};
