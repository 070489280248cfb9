use crate::schema::Validation;
use serde_json::Value;

/// Target scalar representation of a provider primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// `String`
    String,
    /// `bool`
    Bool,
    /// `i64`, only for integer-only numbers whose declared range fits
    Integer,
    /// `f64`, only under [`NumericPolicy::Float64`] when provably exact
    Float,
    /// `serde_json::Number`, lossless for arbitrary-precision numbers
    Number,
}

impl ScalarType {
    /// Rust spelling of the scalar
    pub fn rust_type(self) -> &'static str {
        match self {
            ScalarType::String => "String",
            ScalarType::Bool => "bool",
            ScalarType::Integer => "i64",
            ScalarType::Float => "f64",
            ScalarType::Number => "serde_json::Number",
        }
    }

    /// Whether the Rust type implements `Ord` (usable in `BTreeSet`)
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            ScalarType::String | ScalarType::Bool | ScalarType::Integer
        )
    }

    /// OpenAPI `type` keyword for the scalar
    pub fn openapi_type(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Bool => "boolean",
            ScalarType::Integer => "integer",
            ScalarType::Float | ScalarType::Number => "number",
        }
    }
}

/// Shape of a generated field's type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A primitive value
    Scalar(ScalarType),
    /// `Vec<T>`
    Sequence(Box<FieldType>),
    /// `BTreeSet<T>` (only for ordered scalars)
    Set(Box<FieldType>),
    /// `BTreeMap<String, T>`
    Mapping(Box<FieldType>),
    /// Reference to a synthesized nested type
    Named(String),
}

impl FieldType {
    /// Rust spelling of the type, without the `Option` wrapper
    pub fn rust_type(&self) -> String {
        match self {
            FieldType::Scalar(s) => s.rust_type().to_string(),
            FieldType::Sequence(inner) => format!("Vec<{}>", inner.rust_type()),
            FieldType::Set(inner) => format!("BTreeSet<{}>", inner.rust_type()),
            FieldType::Mapping(inner) => format!("BTreeMap<String, {}>", inner.rust_type()),
            FieldType::Named(name) => name.clone(),
        }
    }

    /// Named types referenced anywhere inside this type
    pub fn named_types(&self) -> Vec<&str> {
        match self {
            FieldType::Scalar(_) => Vec::new(),
            FieldType::Sequence(inner) | FieldType::Set(inner) | FieldType::Mapping(inner) => {
                inner.named_types()
            }
            FieldType::Named(name) => vec![name.as_str()],
        }
    }

    /// Whether any scalar inside uses `serde_json::Number`
    pub fn uses_arbitrary_precision(&self) -> bool {
        match self {
            FieldType::Scalar(s) => *s == ScalarType::Number,
            FieldType::Sequence(inner) | FieldType::Set(inner) | FieldType::Mapping(inner) => {
                inner.uses_arbitrary_precision()
            }
            FieldType::Named(_) => false,
        }
    }
}

/// Result of mapping one provider attribute to a generated field.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    /// Sanitized Rust identifier
    pub field_name: String,
    /// Field type without the optionality wrapper
    pub field_type: FieldType,
    /// Provider wire name, kept verbatim for `#[serde(rename)]`
    pub serialization_key: String,
    /// Field is wrapped in `Option`
    pub optional: bool,
    /// Value must not be echoed into observable state
    pub sensitive: bool,
    /// Collection compares order-insensitively (provider set semantics)
    pub set_semantics: bool,
    /// Provider computes the value when absent
    pub computed: bool,
    /// Dotted attribute path from the resource root
    pub path: String,
    /// Documentation lines for the generated field
    pub docs: Vec<String>,
    /// Provider default value
    pub default: Option<Value>,
    /// Provider validation metadata
    pub validation: Option<Validation>,
}

impl TypeMapping {
    /// Full Rust type including the `Option` wrapper when optional
    pub fn rust_type(&self) -> String {
        if self.optional {
            format!("Option<{}>", self.field_type.rust_type())
        } else {
            self.field_type.rust_type()
        }
    }

    /// Whether the field needs `serde(rename)`
    pub fn needs_rename(&self) -> bool {
        self.field_name.trim_start_matches("r#") != self.serialization_key
    }
}

/// A struct synthesized for a nested block, keyed by its attribute path.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedType {
    /// Stable type name derived from the path
    pub name: String,
    /// Dotted path of the block attribute this type represents
    pub path: String,
    /// Fields of the struct, in attribute order
    pub fields: Vec<TypeMapping>,
}

/// How provider numbers are represented in generated code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumericPolicy {
    /// Integers with an `i64`-sized declared range become `i64`, everything
    /// else `serde_json::Number`.
    #[default]
    Lossless,
    /// Use `f64`; generation fails wherever the declared range cannot be
    /// represented exactly.
    Float64,
}

impl std::str::FromStr for NumericPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lossless" => Ok(NumericPolicy::Lossless),
            "float64" | "f64" => Ok(NumericPolicy::Float64),
            other => Err(format!("unknown numeric policy '{other}' (expected lossless|float64)")),
        }
    }
}
