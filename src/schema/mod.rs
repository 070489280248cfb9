//! # Schema Module
//!
//! In-memory model of a provider's resource schemas and the loader that
//! builds it from a provider schema descriptor.
//!
//! The model is a closed tree: every attribute has an [`AttributeKind`] drawn
//! from a fixed set of variants, nested blocks own their child attributes,
//! and the loader enforces [`MAX_SCHEMA_DEPTH`] so the tree is always finite.
//! Kinds the loader does not recognise are kept as
//! [`AttributeKind::Unsupported`] so that the type mapper can reject them
//! with the offending attribute path.

mod load;
mod types;

pub use load::*;
pub use types::*;
