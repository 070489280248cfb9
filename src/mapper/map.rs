use super::naming::{sanitize_field_name, to_camel_case, unique_name};
use super::types::{FieldType, NestedType, NumericPolicy, ScalarType, TypeMapping};
use crate::error::{GenerateError, Result};
use crate::schema::{AttributeKind, AttributeSchema, NestingMode, Validation};
use serde_json::Number;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// Largest magnitude at which every integer is exactly representable in f64.
const F64_EXACT_INT: u64 = 1 << 53;

/// Maps schema attributes of one resource kind to generated field declarations.
///
/// A mapper is scoped to a kind: nested blocks become named types prefixed
/// with the kind (`Alert` + `target` → `AlertTarget`), and the names handed
/// out are remembered per attribute path so that mapping the same path twice
/// (a computed+optional block appears in both Spec and Status) yields the
/// same type and emits it once.
#[derive(Debug)]
pub struct TypeMapper {
    kind: String,
    policy: NumericPolicy,
    names: BTreeMap<String, String>,
    used: BTreeSet<String>,
    nested: Vec<NestedType>,
}

impl TypeMapper {
    /// Create a mapper for `kind`. The kind's own type names are reserved.
    pub fn new(kind: impl Into<String>, policy: NumericPolicy) -> Self {
        let kind = kind.into();
        let used = [
            kind.clone(),
            format!("{kind}Spec"),
            format!("{kind}Status"),
        ]
        .into_iter()
        .collect();
        Self {
            kind,
            policy,
            names: BTreeMap::new(),
            used,
            nested: Vec::new(),
        }
    }

    /// Kind this mapper names nested types after
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Map a single attribute found at the dotted `path`.
    ///
    /// The last path segment is the attribute's wire name and becomes the
    /// serialization key verbatim.
    pub fn map(&mut self, attr: &AttributeSchema, path: &str) -> Result<TypeMapping> {
        let key = path.rsplit('.').next().unwrap_or(path);
        let field_type = self.map_kind(&attr.kind, attr.validation.as_ref(), path)?;
        let docs = field_docs(attr, &field_type);
        Ok(TypeMapping {
            field_name: sanitize_field_name(key),
            field_type,
            serialization_key: key.to_string(),
            optional: !attr.required,
            sensitive: attr.sensitive,
            set_semantics: attr.kind.is_set(),
            computed: attr.computed,
            path: path.to_string(),
            docs,
            default: attr.default.clone(),
            validation: attr.validation.clone(),
        })
    }

    /// Map a group of sibling attributes under `parent`.
    ///
    /// Rust identifiers are made unique within the group; `reserved` names
    /// are treated as already taken (standard Status fields, for example).
    pub fn map_fields<'a, I>(
        &mut self,
        attrs: I,
        parent: &str,
        reserved: &[&str],
    ) -> Result<Vec<TypeMapping>>
    where
        I: IntoIterator<Item = (&'a String, &'a AttributeSchema)>,
    {
        let mut seen: BTreeSet<String> = reserved.iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        for (name, attr) in attrs {
            let mut mapping = self.map(attr, &format!("{parent}.{name}"))?;
            mapping.field_name = unique_name(&mut seen, &mapping.field_name);
            out.push(mapping);
        }
        Ok(out)
    }

    /// Nested types synthesized so far, in creation order
    pub fn nested_types(&self) -> &[NestedType] {
        &self.nested
    }

    /// Consume the mapper and return the synthesized nested types
    pub fn into_nested_types(self) -> Vec<NestedType> {
        self.nested
    }

    fn map_kind(
        &mut self,
        kind: &AttributeKind,
        validation: Option<&Validation>,
        path: &str,
    ) -> Result<FieldType> {
        match kind {
            AttributeKind::String => Ok(FieldType::Scalar(ScalarType::String)),
            AttributeKind::Bool => Ok(FieldType::Scalar(ScalarType::Bool)),
            AttributeKind::Number => self.map_number(validation, path).map(FieldType::Scalar),
            AttributeKind::List(inner) => Ok(FieldType::Sequence(Box::new(
                self.map_kind(inner, validation, path)?,
            ))),
            AttributeKind::Set(inner) => {
                let elem = self.map_kind(inner, validation, path)?;
                match elem {
                    FieldType::Scalar(s) if s.is_ordered() => Ok(FieldType::Set(Box::new(elem))),
                    other => Ok(FieldType::Sequence(Box::new(other))),
                }
            }
            AttributeKind::Map(inner) => Ok(FieldType::Mapping(Box::new(
                self.map_kind(inner, validation, path)?,
            ))),
            AttributeKind::Block(block) => {
                let name = self.nested_type(path, &block.attributes)?;
                let named = FieldType::Named(name);
                Ok(match block.nesting {
                    NestingMode::Single => named,
                    NestingMode::List | NestingMode::Set => FieldType::Sequence(Box::new(named)),
                    NestingMode::Map => FieldType::Mapping(Box::new(named)),
                })
            }
            AttributeKind::Unsupported(kind) => Err(GenerateError::UnsupportedSchemaKind {
                path: path.to_string(),
                kind: kind.clone(),
            }),
        }
    }

    fn map_number(&self, validation: Option<&Validation>, path: &str) -> Result<ScalarType> {
        let integer = validation.is_some_and(|v| v.integer);
        let range = validation.and_then(|v| v.minimum.as_ref().zip(v.maximum.as_ref()));
        match self.policy {
            NumericPolicy::Lossless => match range {
                Some((min, max)) if integer && min.as_i64().is_some() && max.as_i64().is_some() => {
                    Ok(ScalarType::Integer)
                }
                _ => Ok(ScalarType::Number),
            },
            NumericPolicy::Float64 => {
                if integer && range.is_none() {
                    return Err(GenerateError::NumericPrecision {
                        path: path.to_string(),
                        reason: "integer-only number has no declared range".to_string(),
                    });
                }
                for bound in validation
                    .into_iter()
                    .flat_map(|v| [v.minimum.as_ref(), v.maximum.as_ref()])
                    .flatten()
                {
                    if !exact_in_f64(bound) {
                        return Err(GenerateError::NumericPrecision {
                            path: path.to_string(),
                            reason: format!("bound {bound} is not exactly representable as f64"),
                        });
                    }
                }
                Ok(ScalarType::Float)
            }
        }
    }

    fn nested_type(
        &mut self,
        path: &str,
        attributes: &BTreeMap<String, AttributeSchema>,
    ) -> Result<String> {
        if let Some(name) = self.names.get(path) {
            return Ok(name.clone());
        }
        let suffix: String = path.split('.').skip(1).map(to_camel_case).collect();
        let name = unique_name(&mut self.used, &format!("{}{suffix}", self.kind));
        self.names.insert(path.to_string(), name.clone());
        debug!(kind = %self.kind, path = %path, type_name = %name, "Synthesized nested type");

        let fields = self.map_fields(attributes, path, &[])?;
        self.nested.push(NestedType {
            name: name.clone(),
            path: path.to_string(),
            fields,
        });
        Ok(name)
    }
}

fn exact_in_f64(n: &Number) -> bool {
    if let Some(i) = n.as_i64() {
        i.unsigned_abs() <= F64_EXACT_INT
    } else if let Some(u) = n.as_u64() {
        u <= F64_EXACT_INT
    } else {
        n.as_f64().is_some_and(f64::is_finite)
    }
}

fn field_docs(attr: &AttributeSchema, field_type: &FieldType) -> Vec<String> {
    let mut docs: Vec<String> = attr
        .description
        .iter()
        .flat_map(|d| d.lines())
        .map(|l| l.trim_end().to_string())
        .collect();
    if let Some(summary) = attr.validation.as_ref().and_then(Validation::summary) {
        docs.push(format!("Validation: {summary}."));
    }
    if let Some(default) = &attr.default {
        docs.push(format!("Default: `{default}`."));
    }
    if attr.computed && !attr.required {
        docs.push("Computed by the provider when not set.".to_string());
    }
    if field_type.uses_arbitrary_precision() {
        docs.push("Arbitrary precision number (serde_json `arbitrary_precision`).".to_string());
    }
    if attr.sensitive {
        docs.push("Sensitive: never written to status.".to_string());
    }
    if attr.deprecated {
        docs.push("Deprecated by the provider.".to_string());
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NestedBlock;

    fn block(nesting: NestingMode, attrs: &[(&str, AttributeSchema)]) -> AttributeKind {
        AttributeKind::Block(NestedBlock::new(
            nesting,
            attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ))
    }

    #[test]
    fn scalars_map_to_rust_primitives() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let name = mapper
            .map(&AttributeSchema::required(AttributeKind::String), "alert.name")
            .unwrap();
        assert_eq!(name.rust_type(), "String");
        assert_eq!(name.serialization_key, "name");
        assert!(!name.optional);

        let enabled = mapper
            .map(&AttributeSchema::optional(AttributeKind::Bool), "alert.enabled")
            .unwrap();
        assert_eq!(enabled.rust_type(), "Option<bool>");
    }

    #[test]
    fn numbers_are_lossless_by_default() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let plain = mapper
            .map(&AttributeSchema::required(AttributeKind::Number), "alert.threshold")
            .unwrap();
        assert_eq!(plain.field_type, FieldType::Scalar(ScalarType::Number));
        assert!(plain.docs.iter().any(|d| d.contains("arbitrary_precision")));

        let ranged = AttributeSchema::optional(AttributeKind::Number)
            .with_validation(Validation::integer_range(0, 100));
        let mapped = mapper.map(&ranged, "alert.minutes").unwrap();
        assert_eq!(mapped.rust_type(), "Option<i64>");
        assert!(mapped.docs.iter().any(|d| d == "Validation: range: 0..=100; integer."));
    }

    #[test]
    fn float64_policy_refuses_to_narrow() {
        let mapper = TypeMapper::new("Alert", NumericPolicy::Float64);
        let unbounded = Validation {
            integer: true,
            ..Validation::default()
        };
        let err = mapper.map_number(Some(&unbounded), "alert.count").unwrap_err();
        assert!(matches!(err, GenerateError::NumericPrecision { ref path, .. } if path == "alert.count"));

        let huge = Validation::integer_range(0, i64::MAX);
        assert!(mapper.map_number(Some(&huge), "alert.count").is_err());

        let exact = Validation::integer_range(-(1 << 53), 1 << 53);
        assert_eq!(mapper.map_number(Some(&exact), "alert.count").unwrap(), ScalarType::Float);
        assert_eq!(mapper.map_number(None, "alert.ratio").unwrap(), ScalarType::Float);
    }

    #[test]
    fn sets_of_ordered_scalars_use_btreeset() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let tags = mapper
            .map(
                &AttributeSchema::optional(AttributeKind::set(AttributeKind::String)),
                "alert.tags",
            )
            .unwrap();
        assert_eq!(tags.rust_type(), "Option<BTreeSet<String>>");
        assert!(tags.set_semantics);

        let weights = mapper
            .map(
                &AttributeSchema::optional(AttributeKind::set(AttributeKind::Number)),
                "alert.weights",
            )
            .unwrap();
        assert_eq!(weights.rust_type(), "Option<Vec<serde_json::Number>>");
        assert!(weights.set_semantics);
    }

    #[test]
    fn nested_blocks_become_named_types() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let target = AttributeSchema::optional(block(
            NestingMode::List,
            &[
                ("threshold", AttributeSchema::required(AttributeKind::Number)),
                (
                    "labels",
                    AttributeSchema::optional(AttributeKind::map(AttributeKind::String)),
                ),
            ],
        ));
        let mapping = mapper.map(&target, "alert.target").unwrap();
        assert_eq!(mapping.rust_type(), "Option<Vec<AlertTarget>>");

        let nested = mapper.nested_types();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "AlertTarget");
        assert_eq!(nested[0].path, "alert.target");
        let keys: Vec<_> = nested[0]
            .fields
            .iter()
            .map(|f| f.serialization_key.as_str())
            .collect();
        assert_eq!(keys, vec!["labels", "threshold"]);
        assert_eq!(nested[0].fields[0].rust_type(), "Option<BTreeMap<String, String>>");
    }

    #[test]
    fn same_path_reuses_the_same_type() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let attr = AttributeSchema::optional(block(
            NestingMode::Single,
            &[("url", AttributeSchema::optional(AttributeKind::String))],
        ))
        .with_computed();
        let first = mapper.map(&attr, "alert.webhook").unwrap();
        let second = mapper.map(&attr, "alert.webhook").unwrap();
        assert_eq!(first.field_type, second.field_type);
        assert_eq!(mapper.nested_types().len(), 1);
    }

    #[test]
    fn colliding_type_names_get_a_suffix() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let inner = |k: &str| {
            AttributeSchema::optional(block(
                NestingMode::Single,
                &[(k, AttributeSchema::optional(AttributeKind::String))],
            ))
        };
        let attrs: BTreeMap<String, AttributeSchema> = [
            ("a_b".to_string(), inner("x")),
            ("a-b".to_string(), inner("y")),
        ]
        .into_iter()
        .collect();
        let fields = mapper.map_fields(&attrs, "alert", &[]).unwrap();
        assert_eq!(fields[0].rust_type(), "Option<AlertAB>");
        assert_eq!(fields[1].rust_type(), "Option<AlertAB2>");
        assert_eq!(fields[0].field_name, "a_b");
        assert_eq!(fields[1].field_name, "a_b2");
    }

    #[test]
    fn reserved_field_names_are_avoided() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let attrs: BTreeMap<String, AttributeSchema> = [(
            "phase".to_string(),
            AttributeSchema::computed(AttributeKind::String),
        )]
        .into_iter()
        .collect();
        let fields = mapper.map_fields(&attrs, "alert", &["phase"]).unwrap();
        assert_eq!(fields[0].field_name, "phase2");
        assert_eq!(fields[0].serialization_key, "phase");
    }

    #[test]
    fn unsupported_kinds_report_their_path() {
        let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
        let attr = AttributeSchema::optional(block(
            NestingMode::Single,
            &[(
                "payload",
                AttributeSchema::optional(AttributeKind::Unsupported("dynamic".into())),
            )],
        ));
        let err = mapper.map(&attr, "alert.target").unwrap_err();
        match err {
            GenerateError::UnsupportedSchemaKind { path, kind } => {
                assert_eq!(path, "alert.target.payload");
                assert_eq!(kind, "dynamic");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mapping_is_deterministic() {
        let attr = AttributeSchema::optional(block(
            NestingMode::Map,
            &[
                ("b", AttributeSchema::optional(AttributeKind::String)),
                ("a", AttributeSchema::required(AttributeKind::Bool)),
            ],
        ))
        .with_description("Routes.\nKeyed by name.");
        let run = || {
            let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
            let m = mapper.map(&attr, "alert.routes").unwrap();
            (m, mapper.into_nested_types())
        };
        assert_eq!(run(), run());
        let (m, _) = run();
        assert_eq!(m.docs[..2], ["Routes.".to_string(), "Keyed by name.".to_string()]);
        assert_eq!(m.rust_type(), "Option<BTreeMap<String, AlertRoutes>>");
    }
}
