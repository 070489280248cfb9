use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on attribute nesting accepted by the loader.
///
/// Real providers stay well under 6 levels; anything deeper is treated as a
/// malformed (or self-referencing) descriptor.
pub const MAX_SCHEMA_DEPTH: usize = 16;

/// All resource schemas exposed by one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSchema {
    /// Short provider name (e.g. `wavefront`)
    pub name: String,
    /// Source address the schema was loaded from (e.g. `registry.terraform.io/vmware/wavefront`)
    pub source: String,
    /// Resource schemas, sorted by name
    pub resources: Vec<ResourceSchema>,
}

impl ProviderSchema {
    /// Look up a resource schema by its provider name
    pub fn resource(&self, name: &str) -> Option<&ResourceSchema> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// The attribute tree of a single provider resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    /// Provider resource type name, unique per provider (e.g. `wavefront_alert`)
    pub name: String,
    /// Schema version declared by the provider
    pub version: i64,
    /// Resource-level documentation
    pub description: Option<String>,
    /// Attributes keyed by their wire name
    pub attributes: BTreeMap<String, AttributeSchema>,
}

impl ResourceSchema {
    /// Visit every attribute in the tree, depth first, with its dotted path.
    ///
    /// Paths are rooted at the resource name: `alert.target.threshold`.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &AttributeSchema),
    {
        fn walk_attrs<F>(prefix: &str, attrs: &BTreeMap<String, AttributeSchema>, visit: &mut F)
        where
            F: FnMut(&str, &AttributeSchema),
        {
            for (name, attr) in attrs {
                let path = format!("{prefix}.{name}");
                visit(&path, attr);
                if let Some(block) = attr.kind.nested_block() {
                    walk_attrs(&path, &block.attributes, visit);
                }
            }
        }
        walk_attrs(&self.name, &self.attributes, &mut visit);
    }

    /// Maximum attribute nesting depth (top-level attributes have depth 1)
    pub fn depth(&self) -> usize {
        self.attributes
            .values()
            .map(AttributeSchema::depth)
            .max()
            .unwrap_or(0)
    }
}

/// One attribute of a resource or nested block.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    /// Value kind, including any nested schema
    pub kind: AttributeKind,
    /// User must supply a value
    pub required: bool,
    /// User may supply a value
    pub optional: bool,
    /// Provider computes the value when the user does not supply one
    pub computed: bool,
    /// Value must never be echoed back into observable state
    pub sensitive: bool,
    /// Provider marks the attribute as deprecated
    pub deprecated: bool,
    /// Provider documentation for the attribute
    pub description: Option<String>,
    /// Provider default value, if declared
    pub default: Option<Value>,
    /// Allowed values / ranges, if declared
    pub validation: Option<Validation>,
}

impl AttributeSchema {
    /// A plain attribute of the given kind with every flag cleared
    pub fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            deprecated: false,
            description: None,
            default: None,
            validation: None,
        }
    }

    /// Required attribute of the given kind
    pub fn required(kind: AttributeKind) -> Self {
        Self {
            required: true,
            ..Self::new(kind)
        }
    }

    /// Optional attribute of the given kind
    pub fn optional(kind: AttributeKind) -> Self {
        Self {
            optional: true,
            ..Self::new(kind)
        }
    }

    /// Computed-only attribute of the given kind
    pub fn computed(kind: AttributeKind) -> Self {
        Self {
            computed: true,
            ..Self::new(kind)
        }
    }

    /// Builder: attach a default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Builder: mark as computed in addition to the current flags
    pub fn with_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Builder: mark as sensitive
    pub fn with_sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Builder: attach validation metadata
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Builder: attach documentation
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The attribute is observed state only: computed and not user-settable.
    pub fn is_status_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Nesting depth of this attribute (scalars have depth 1)
    pub fn depth(&self) -> usize {
        1 + self.kind.nested_depth()
    }
}

/// Closed set of attribute kinds.
///
/// `Unsupported` keeps kinds the loader does not understand (cty tuples,
/// dynamic values, future additions) so the type mapper can reject them with
/// the attribute's path instead of dropping them during loading.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    /// UTF-8 string
    String,
    /// Arbitrary-precision number
    Number,
    /// Boolean
    Bool,
    /// Ordered list of elements
    List(Box<AttributeKind>),
    /// Unordered set of unique elements
    Set(Box<AttributeKind>),
    /// String-keyed map of elements
    Map(Box<AttributeKind>),
    /// Nested block or object with its own attributes
    Block(NestedBlock),
    /// A kind outside the supported space, carried by name
    Unsupported(String),
}

impl AttributeKind {
    /// Shorthand for `List(elem)`
    pub fn list(elem: AttributeKind) -> Self {
        Self::List(Box::new(elem))
    }

    /// Shorthand for `Set(elem)`
    pub fn set(elem: AttributeKind) -> Self {
        Self::Set(Box::new(elem))
    }

    /// Shorthand for `Map(elem)`
    pub fn map(elem: AttributeKind) -> Self {
        Self::Map(Box::new(elem))
    }

    /// The nested block reachable through this kind, looking through collections.
    pub fn nested_block(&self) -> Option<&NestedBlock> {
        match self {
            Self::Block(block) => Some(block),
            Self::List(inner) | Self::Set(inner) | Self::Map(inner) => inner.nested_block(),
            _ => None,
        }
    }

    /// Whether the kind has set semantics (order-insensitive comparison)
    pub fn is_set(&self) -> bool {
        match self {
            Self::Set(_) => true,
            Self::Block(block) => block.nesting == NestingMode::Set,
            _ => false,
        }
    }

    fn nested_depth(&self) -> usize {
        match self {
            Self::List(inner) | Self::Set(inner) | Self::Map(inner) => inner.nested_depth(),
            Self::Block(block) => block
                .attributes
                .values()
                .map(AttributeSchema::depth)
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
            Self::List(inner) => write!(f, "list({inner})"),
            Self::Set(inner) => write!(f, "set({inner})"),
            Self::Map(inner) => write!(f, "map({inner})"),
            Self::Block(block) => write!(f, "block({})", block.nesting),
            Self::Unsupported(kind) => write!(f, "{kind}"),
        }
    }
}

/// How a nested block repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NestingMode {
    /// Exactly one (possibly absent) instance
    Single,
    /// Ordered list of instances
    List,
    /// Unordered set of instances
    Set,
    /// Instances keyed by string
    Map,
}

impl fmt::Display for NestingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NestingMode::Single => write!(f, "single"),
            NestingMode::List => write!(f, "list"),
            NestingMode::Set => write!(f, "set"),
            NestingMode::Map => write!(f, "map"),
        }
    }
}

/// A nested block: its own attribute tree plus repetition rules.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedBlock {
    /// Repetition mode
    pub nesting: NestingMode,
    /// Attributes of one block instance
    pub attributes: BTreeMap<String, AttributeSchema>,
    /// Minimum number of instances
    pub min_items: Option<u64>,
    /// Maximum number of instances
    pub max_items: Option<u64>,
}

impl NestedBlock {
    /// A block with the given nesting and attributes and no item bounds
    pub fn new(nesting: NestingMode, attributes: BTreeMap<String, AttributeSchema>) -> Self {
        Self {
            nesting,
            attributes,
            min_items: None,
            max_items: None,
        }
    }
}

/// Declared constraints on an attribute's values.
///
/// Whatever cannot be expressed mechanically in the generated schema is
/// carried through as documentation (`description`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    /// Enumerated allowed values
    pub allowed_values: Vec<Value>,
    /// Inclusive numeric lower bound
    pub minimum: Option<Number>,
    /// Inclusive numeric upper bound
    pub maximum: Option<Number>,
    /// Only whole numbers are valid
    pub integer: bool,
    /// Minimum string length
    pub min_length: Option<u64>,
    /// Maximum string length
    pub max_length: Option<u64>,
    /// Regular expression the value must match
    pub pattern: Option<String>,
    /// Free-form description of constraints that are not machine-readable
    pub description: Option<String>,
}

impl Validation {
    /// Integer-only validation with an inclusive range
    pub fn integer_range(minimum: i64, maximum: i64) -> Self {
        Self {
            integer: true,
            minimum: Some(Number::from(minimum)),
            maximum: Some(Number::from(maximum)),
            ..Self::default()
        }
    }

    /// Enumerated string values
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_values: values
                .into_iter()
                .map(|v| Value::String(v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Human-readable summary used in generated documentation
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.allowed_values.is_empty() {
            let values = self
                .allowed_values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("one of: {values}"));
        }
        match (&self.minimum, &self.maximum) {
            (Some(min), Some(max)) => parts.push(format!("range: {min}..={max}")),
            (Some(min), None) => parts.push(format!("minimum: {min}")),
            (None, Some(max)) => parts.push(format!("maximum: {max}")),
            (None, None) => {}
        }
        if self.integer {
            parts.push("integer".to_string());
        }
        if let Some(pattern) = &self.pattern {
            parts.push(format!("pattern: {pattern}"));
        }
        if let Some(description) = &self.description {
            parts.push(description.clone());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
