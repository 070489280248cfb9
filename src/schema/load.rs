use super::types::{
    AttributeKind, AttributeSchema, NestedBlock, NestingMode, ProviderSchema, ResourceSchema,
    Validation, MAX_SCHEMA_DEPTH,
};
use crate::error::{GenerateError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Serialization format of a provider schema descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    /// JSON, as printed by `terraform providers schema -json`
    Json,
    /// The same document expressed as YAML
    Yaml,
}

impl DescriptorFormat {
    /// Pick the format from a file extension (`.yaml`/`.yml` → YAML, anything else → JSON)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => DescriptorFormat::Yaml,
            _ => DescriptorFormat::Json,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    provider_schemas: BTreeMap<String, ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    #[serde(default)]
    resource_schemas: BTreeMap<String, ResourceEntry>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    #[serde(default)]
    version: i64,
    block: BlockEntry,
}

#[derive(Debug, Default, Deserialize)]
struct BlockEntry {
    #[serde(default)]
    attributes: BTreeMap<String, AttributeEntry>,
    #[serde(default)]
    block_types: BTreeMap<String, BlockTypeEntry>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttributeEntry {
    #[serde(rename = "type", default)]
    ty: Option<Value>,
    #[serde(default)]
    nested_type: Option<NestedTypeEntry>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    computed: bool,
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    default: Option<Value>,
    #[serde(rename = "x-kubeform-validation", default)]
    validation: Option<Validation>,
}

#[derive(Debug, Deserialize)]
struct NestedTypeEntry {
    nesting_mode: String,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeEntry>,
    #[serde(default)]
    min_items: Option<u64>,
    #[serde(default)]
    max_items: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BlockTypeEntry {
    nesting_mode: String,
    #[serde(default)]
    block: BlockEntry,
    #[serde(default)]
    min_items: Option<u64>,
    #[serde(default)]
    max_items: Option<u64>,
}

/// Load a provider schema descriptor from disk.
///
/// `provider` selects one provider when the document describes several; it
/// matches either the full source address or its last path segment.
pub fn load_file(path: &Path, provider: Option<&str>) -> Result<ProviderSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GenerateError::schema_load(format!("cannot read {}: {e}", path.display()))
    })?;
    let schema = load_str(&content, DescriptorFormat::from_path(path), provider)?;
    info!(
        path = %path.display(),
        provider = %schema.name,
        resources = schema.resources.len(),
        "Loaded provider schema"
    );
    Ok(schema)
}

/// Parse a provider schema descriptor held in memory.
pub fn load_str(
    content: &str,
    format: DescriptorFormat,
    provider: Option<&str>,
) -> Result<ProviderSchema> {
    let document: Document = match format {
        DescriptorFormat::Json => serde_json::from_str(content)
            .map_err(|e| GenerateError::schema_load(format!("invalid JSON descriptor: {e}")))?,
        DescriptorFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| GenerateError::schema_load(format!("invalid YAML descriptor: {e}")))?,
    };
    load(document, provider)
}

fn load(document: Document, provider: Option<&str>) -> Result<ProviderSchema> {
    let (source, entry) = select_provider(document, provider)?;
    let name = source
        .rsplit('/')
        .next()
        .unwrap_or(source.as_str())
        .to_string();

    let mut resources = Vec::with_capacity(entry.resource_schemas.len());
    for (resource_name, resource) in entry.resource_schemas {
        if resource_name.trim().is_empty() {
            return Err(GenerateError::schema_load("resource with empty name"));
        }
        let attributes = convert_block(&resource_name, resource.block.attributes, resource.block.block_types, 1)?;
        debug!(resource = %resource_name, attributes = attributes.len(), "Converted resource schema");
        resources.push(ResourceSchema {
            name: resource_name,
            version: resource.version,
            description: resource.block.description,
            attributes,
        });
    }

    Ok(ProviderSchema {
        name,
        source,
        resources,
    })
}

fn select_provider(
    document: Document,
    provider: Option<&str>,
) -> Result<(String, ProviderEntry)> {
    let available = document
        .provider_schemas
        .keys()
        .cloned()
        .collect::<Vec<_>>();
    let mut schemas = document.provider_schemas;
    let key = match provider {
        Some(wanted) => available
            .iter()
            .find(|k| k.as_str() == wanted || k.rsplit('/').next() == Some(wanted))
            .cloned()
            .ok_or_else(|| {
                GenerateError::schema_load(format!(
                    "provider '{wanted}' not found; available: [{}]",
                    available.join(", ")
                ))
            })?,
        None => match available.as_slice() {
            [only] => only.clone(),
            [] => return Err(GenerateError::schema_load("descriptor contains no providers")),
            _ => {
                return Err(GenerateError::schema_load(format!(
                    "descriptor contains several providers, select one of: [{}]",
                    available.join(", ")
                )))
            }
        },
    };
    let entry = schemas
        .remove(&key)
        .ok_or_else(|| GenerateError::schema_load(format!("provider '{key}' vanished")))?;
    Ok((key, entry))
}

fn convert_block(
    path: &str,
    attributes: BTreeMap<String, AttributeEntry>,
    block_types: BTreeMap<String, BlockTypeEntry>,
    depth: usize,
) -> Result<BTreeMap<String, AttributeSchema>> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(GenerateError::schema_load(format!(
            "'{path}' nests deeper than {MAX_SCHEMA_DEPTH} levels"
        )));
    }
    let mut out = BTreeMap::new();
    for (name, entry) in attributes {
        let attr_path = format!("{path}.{name}");
        let attr = convert_attribute(&attr_path, entry, depth)?;
        out.insert(name, attr);
    }
    for (name, entry) in block_types {
        let attr_path = format!("{path}.{name}");
        if out.contains_key(&name) {
            return Err(GenerateError::schema_load(format!(
                "'{attr_path}' is declared both as attribute and block"
            )));
        }
        let nesting = parse_nesting(&attr_path, &entry.nesting_mode)?;
        let inner = convert_block(
            &attr_path,
            entry.block.attributes,
            entry.block.block_types,
            depth + 1,
        )?;
        let required = entry.min_items.unwrap_or(0) > 0;
        let mut attr = AttributeSchema::new(AttributeKind::Block(NestedBlock {
            nesting,
            attributes: inner,
            min_items: entry.min_items,
            max_items: entry.max_items,
        }));
        attr.required = required;
        attr.optional = !required;
        attr.description = entry.block.description;
        out.insert(name, attr);
    }
    Ok(out)
}

fn convert_attribute(path: &str, entry: AttributeEntry, depth: usize) -> Result<AttributeSchema> {
    if entry.required && entry.computed {
        return Err(GenerateError::schema_load(format!(
            "'{path}' cannot be both required and computed"
        )));
    }
    if entry.required && entry.optional {
        return Err(GenerateError::schema_load(format!(
            "'{path}' cannot be both required and optional"
        )));
    }
    let kind = match (entry.ty, entry.nested_type) {
        (Some(ty), None) => parse_type(path, &ty, entry.computed, depth)?,
        (None, Some(nested)) => {
            let nesting = parse_nesting(path, &nested.nesting_mode)?;
            let attributes = convert_block(path, nested.attributes, BTreeMap::new(), depth + 1)?;
            AttributeKind::Block(NestedBlock {
                nesting,
                attributes,
                min_items: nested.min_items,
                max_items: nested.max_items,
            })
        }
        (Some(_), Some(_)) => {
            return Err(GenerateError::schema_load(format!(
                "'{path}' declares both type and nested_type"
            )))
        }
        (None, None) => {
            return Err(GenerateError::schema_load(format!("'{path}' has no type")))
        }
    };
    // Providers always set one of the three flags; treat a bare attribute as optional.
    let optional = entry.optional || (!entry.required && !entry.computed);
    Ok(AttributeSchema {
        kind,
        required: entry.required,
        optional,
        computed: entry.computed,
        sensitive: entry.sensitive,
        deprecated: entry.deprecated,
        description: entry.description,
        default: entry.default,
        validation: entry.validation,
    })
}

/// Parse a cty type expression.
fn parse_type(path: &str, ty: &Value, computed: bool, depth: usize) -> Result<AttributeKind> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(GenerateError::schema_load(format!(
            "'{path}' nests deeper than {MAX_SCHEMA_DEPTH} levels"
        )));
    }
    match ty {
        Value::String(s) => Ok(match s.as_str() {
            "string" => AttributeKind::String,
            "number" => AttributeKind::Number,
            "bool" => AttributeKind::Bool,
            other => AttributeKind::Unsupported(other.to_string()),
        }),
        Value::Array(parts) => {
            let constructor = parts.first().and_then(Value::as_str).ok_or_else(|| {
                GenerateError::schema_load(format!("'{path}' has a malformed type expression"))
            })?;
            let arg = parts.get(1);
            match (constructor, arg) {
                ("list", Some(elem)) => Ok(AttributeKind::list(parse_type(path, elem, computed, depth + 1)?)),
                ("set", Some(elem)) => Ok(AttributeKind::set(parse_type(path, elem, computed, depth + 1)?)),
                ("map", Some(elem)) => Ok(AttributeKind::map(parse_type(path, elem, computed, depth + 1)?)),
                ("object", Some(Value::Object(fields))) => {
                    let mut attributes = BTreeMap::new();
                    for (name, field_ty) in fields {
                        let field_path = format!("{path}.{name}");
                        let kind = parse_type(&field_path, field_ty, computed, depth + 1)?;
                        let mut attr = AttributeSchema::optional(kind);
                        attr.computed = computed;
                        attributes.insert(name.clone(), attr);
                    }
                    Ok(AttributeKind::Block(NestedBlock::new(NestingMode::Single, attributes)))
                }
                ("list" | "set" | "map" | "object", _) => Err(GenerateError::schema_load(format!(
                    "'{path}' has a malformed {constructor} type expression"
                ))),
                (other, _) => Ok(AttributeKind::Unsupported(other.to_string())),
            }
        }
        _ => Err(GenerateError::schema_load(format!(
            "'{path}' has a malformed type expression: {ty}"
        ))),
    }
}

fn parse_nesting(path: &str, mode: &str) -> Result<NestingMode> {
    match mode {
        "single" | "group" => Ok(NestingMode::Single),
        "list" => Ok(NestingMode::List),
        "set" => Ok(NestingMode::Set),
        "map" => Ok(NestingMode::Map),
        other => Err(GenerateError::schema_load(format!(
            "'{path}' has unknown nesting mode '{other}'"
        ))),
    }
}
