//! CustomResourceDefinition manifests.
//!
//! The OpenAPI v3 schema is derived from the same [`TypeMapping`]s that drive
//! the Rust source, so the manifest and the generated types always agree on
//! field names, optionality and collection shapes.

use serde_json::{json, Map, Value};

use super::api::GeneratedApi;
use crate::error::{GenerateError, Result};
use crate::mapper::{FieldType, NestedType, ScalarType, TypeMapping};
use crate::runtime::TERMINATION_POLICY_KEY;

/// Render the CRD of one API as YAML
pub fn render_crd(api: &GeneratedApi) -> Result<String> {
    let manifest = crd_manifest(api);
    serde_yaml::to_string(&manifest)
        .map_err(|source| GenerateError::template(format!("CRD for {}", api.kind), source))
}

/// Build the CRD of one API as a JSON value
pub fn crd_manifest(api: &GeneratedApi) -> Value {
    let singular = api.kind.to_ascii_lowercase();
    json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": {
            "name": format!("{}.{}", api.plural, api.group),
            "annotations": {
                "kubeform.com/resource-type": api.resource_type,
            },
        },
        "spec": {
            "group": api.group,
            "names": {
                "kind": api.kind,
                "listKind": format!("{}List", api.kind),
                "plural": api.plural,
                "singular": singular,
                "categories": ["kubeform"],
            },
            "scope": "Namespaced",
            "versions": [{
                "name": api.version,
                "served": true,
                "storage": true,
                "subresources": { "status": {} },
                "additionalPrinterColumns": [
                    { "name": "Phase", "type": "string", "jsonPath": ".status.phase" },
                    { "name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp" },
                ],
                "schema": { "openAPIV3Schema": root_schema(api) },
            }],
        },
    })
}

fn root_schema(api: &GeneratedApi) -> Value {
    let mut root = json!({
        "type": "object",
        "required": ["spec"],
        "properties": {
            "spec": spec_schema(api),
            "status": status_schema(api),
        },
    });
    if let Some(description) = &api.description {
        root["description"] = Value::String(description.clone());
    }
    root
}

fn spec_schema(api: &GeneratedApi) -> Value {
    let mut schema = object_schema(&api.spec_fields, &api.nested);
    schema["properties"][TERMINATION_POLICY_KEY] = json!({
        "type": "string",
        "enum": ["Delete", "DoNotTerminate"],
        "default": "Delete",
        "description": "What happens to the external resource when this object is deleted.",
    });
    schema
}

fn status_schema(api: &GeneratedApi) -> Value {
    let visible: Vec<TypeMapping> = api
        .status_fields
        .iter()
        .filter(|m| !m.sensitive)
        .map(|m| TypeMapping {
            optional: true,
            ..m.clone()
        })
        .collect();
    let mut schema = object_schema(&visible, &api.nested);
    let props = &mut schema["properties"];
    props["observedGeneration"] = json!({ "type": "integer", "format": "int64" });
    props["phase"] = json!({
        "type": "string",
        "enum": ["Pending", "Creating", "Ready", "Updating", "Deleting", "Deleted"],
    });
    props["conditions"] = json!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "items": {
            "type": "object",
            "required": ["type", "status"],
            "properties": {
                "type": { "type": "string" },
                "status": { "type": "string", "enum": ["True", "False", "Unknown"] },
                "reason": { "type": "string" },
                "message": { "type": "string" },
                "lastTransitionTime": { "type": "string", "format": "date-time" },
            },
        },
    });
    props["externalID"] = json!({ "type": "string" });
    props["specHash"] = json!({ "type": "string" });
    props["appliedDigests"] = json!({
        "type": "object",
        "additionalProperties": { "type": "string" },
    });
    props["retryCount"] = json!({ "type": "integer", "format": "int32", "minimum": 0 });
    props["stalledHash"] = json!({ "type": "string" });
    schema
}

fn object_schema(fields: &[TypeMapping], nested: &[NestedType]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in fields {
        properties.insert(field.serialization_key.clone(), field_schema(field, nested));
        if !field.optional {
            required.push(Value::String(field.serialization_key.clone()));
        }
    }
    let mut schema = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    schema
}

fn field_schema(field: &TypeMapping, nested: &[NestedType]) -> Value {
    let mut schema = type_schema(&field.field_type, nested);
    if field.set_semantics && schema["type"] == "array" {
        let scalar_items = schema["items"]["type"]
            .as_str()
            .is_some_and(|t| t != "object" && t != "array");
        if scalar_items {
            schema["x-kubernetes-list-type"] = json!("set");
        }
    }
    if let Some(v) = &field.validation {
        // Validation constrains the scalar elements of a collection.
        let path = element_path(&schema);
        let target = path.iter().fold(&mut schema, |node, key| &mut node[*key]);
        if !v.allowed_values.is_empty() {
            target["enum"] = Value::Array(v.allowed_values.clone());
        }
        if let Some(min) = &v.minimum {
            target["minimum"] = Value::Number(min.clone());
        }
        if let Some(max) = &v.maximum {
            target["maximum"] = Value::Number(max.clone());
        }
        if let Some(n) = v.min_length {
            target["minLength"] = json!(n);
        }
        if let Some(n) = v.max_length {
            target["maxLength"] = json!(n);
        }
        if let Some(p) = &v.pattern {
            target["pattern"] = json!(p);
        }
    }
    if let Some(default) = field.default.as_ref().filter(|d| !d.is_null()) {
        schema["default"] = default.clone();
    }
    let description = field
        .docs
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !description.is_empty() {
        schema["description"] = Value::String(description);
    }
    schema
}

// Keys leading from a collection schema down to its innermost element.
fn element_path(schema: &Value) -> Vec<&'static str> {
    let mut path = Vec::new();
    let mut node = schema;
    loop {
        let key = if node["type"] == "array" {
            "items"
        } else if node["type"] == "object" && node["additionalProperties"].is_object() {
            "additionalProperties"
        } else {
            return path;
        };
        path.push(key);
        node = &node[key];
    }
}

fn type_schema(ty: &FieldType, nested: &[NestedType]) -> Value {
    match ty {
        FieldType::Scalar(s) => {
            let mut schema = json!({ "type": s.openapi_type() });
            match s {
                ScalarType::Integer => schema["format"] = json!("int64"),
                ScalarType::Float => schema["format"] = json!("double"),
                _ => {}
            }
            schema
        }
        FieldType::Sequence(inner) | FieldType::Set(inner) => json!({
            "type": "array",
            "items": type_schema(inner, nested),
        }),
        FieldType::Mapping(inner) => json!({
            "type": "object",
            "additionalProperties": type_schema(inner, nested),
        }),
        FieldType::Named(name) => match nested.iter().find(|n| &n.name == name) {
            Some(n) => object_schema(&n.fields, nested),
            None => json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true }),
        },
    }
}
