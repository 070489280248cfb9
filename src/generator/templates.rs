use askama::Template;

use crate::error::{GenerateError, Result};
use crate::mapper::{FieldType, TypeMapping};

/// A generated struct field ready for rendering
#[derive(Debug, Clone)]
pub struct FieldView {
    /// Rust identifier
    pub name: String,
    /// Full Rust type, including `Option`
    pub ty: String,
    /// Contents of the `#[serde(...)]` attribute
    pub serde_attr: String,
    /// Doc comment lines, each with its leading space
    pub docs: Vec<String>,
}

impl FieldView {
    /// Build a view from a type mapping
    pub fn from_mapping(mapping: &TypeMapping) -> Self {
        let mut serde_attr = format!("rename = {:?}", mapping.serialization_key);
        if mapping.optional {
            serde_attr.push_str(", default, skip_serializing_if = \"Option::is_none\"");
        }
        Self {
            name: mapping.field_name.clone(),
            ty: mapping.rust_type(),
            serde_attr,
            docs: doc_lines(&mapping.docs),
        }
    }
}

/// A nested struct ready for rendering
#[derive(Debug, Clone)]
pub struct StructView {
    /// Type name
    pub name: String,
    /// Doc comment lines
    pub docs: Vec<String>,
    /// Fields in attribute order
    pub fields: Vec<FieldView>,
}

/// A kind as listed in registry modules
#[derive(Debug, Clone)]
pub struct KindEntry {
    /// Kind name (`Alert`)
    pub kind: String,
    /// Module identifier (`alert`)
    pub module: String,
}

/// Template data for one kind's API module
#[derive(Template)]
#[template(path = "api.rs.txt", escape = "none")]
pub struct ApiTemplateData {
    /// Kind name
    pub kind: String,
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Lower-case plural
    pub plural: String,
    /// Provider resource type
    pub resource_type: String,
    /// Resource documentation lines
    pub docs: Vec<String>,
    /// Spec fields (excluding `terminationPolicy`)
    pub spec_fields: Vec<FieldView>,
    /// Observed provider fields in Status
    pub status_fields: Vec<FieldView>,
    /// Nested block types
    pub nested: Vec<StructView>,
    /// Some field type uses `BTreeSet`
    pub uses_btreeset: bool,
    /// Some field uses `serde_json::Number`
    pub arbitrary_precision: bool,
}

/// Template data for the shared status types module
#[derive(Template)]
#[template(path = "common.rs.txt", escape = "none")]
pub struct CommonTemplateData {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
}

/// Template data for the API registry (`apis/<version>/mod.rs`)
#[derive(Template)]
#[template(path = "apis_mod.rs.txt", escape = "none")]
pub struct ApisModTemplateData {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// All kinds, sorted by kind
    pub kinds: Vec<KindEntry>,
}

/// Template data for one kind's controller module
#[derive(Template)]
#[template(path = "controller.rs.txt", escape = "none")]
pub struct ControllerTemplateData {
    /// Kind name
    pub kind: String,
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Provider resource type
    pub resource_type: String,
    /// Rust path of the API version module
    pub api_path: String,
    /// Rust fields of the Spec struct
    pub spec_fields: Vec<String>,
    /// Rust fields of the Status struct that carry provider attributes
    pub status_fields: Vec<String>,
    /// `FieldBinding` constructor expressions
    pub bindings: Vec<String>,
}

/// Template data for the controller registry (`controllers/mod.rs`)
#[derive(Template)]
#[template(path = "controllers_mod.rs.txt", escape = "none")]
pub struct ControllersModTemplateData {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// All kinds, sorted by kind
    pub kinds: Vec<KindEntry>,
}

/// Render a template, naming the artifact in the error
pub fn render<T: Template>(template: &T, artifact: &str) -> Result<String> {
    template
        .render()
        .map_err(|source| GenerateError::template(artifact, source))
}

/// Prefix non-empty doc lines with a space so they render as `/// text`
pub fn doc_lines<S: AsRef<str>>(docs: &[S]) -> Vec<String> {
    docs.iter()
        .map(|line| {
            let line = line.as_ref().trim_end();
            if line.is_empty() {
                String::new()
            } else {
                format!(" {line}")
            }
        })
        .collect()
}

/// Whether a field type mentions `BTreeSet` anywhere
pub fn uses_btreeset(ty: &FieldType) -> bool {
    match ty {
        FieldType::Set(_) => true,
        FieldType::Sequence(inner) | FieldType::Mapping(inner) => uses_btreeset(inner),
        FieldType::Scalar(_) | FieldType::Named(_) => false,
    }
}
