//! # Type Mapper
//!
//! Turns schema attributes into generated field declarations.
//!
//! The mapper is total over [`AttributeKind`](crate::schema::AttributeKind):
//! every supported kind has exactly one Rust representation and
//! `Unsupported` kinds are rejected with the offending attribute path. Wire
//! names are never rewritten; only the Rust identifier is sanitized, and the
//! original name is kept as the serialization key.
//!
//! | Provider kind | Rust type |
//! |---|---|
//! | string | `String` |
//! | bool | `bool` |
//! | number | `i64` (integer with `i64` range) or `serde_json::Number` |
//! | list(T) | `Vec<T>` |
//! | set(T) | `BTreeSet<T>` for ordered scalars, else `Vec<T>` |
//! | map(T) | `BTreeMap<String, T>` |
//! | nested block | named struct, wrapped per nesting mode |

mod map;
mod naming;
mod types;

pub use map::TypeMapper;
pub use naming::{
    kind_for_resource, plural_for_kind, sanitize_field_name, to_camel_case, to_snake_case,
    unique_name,
};
pub use types::{FieldType, NestedType, NumericPolicy, ScalarType, TypeMapping};
