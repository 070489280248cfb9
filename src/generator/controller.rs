use std::collections::BTreeSet;

use super::api::GeneratedApi;
use super::templates::{
    render, ControllerTemplateData, ControllersModTemplateData, KindEntry,
};
use crate::error::{GenerateError, Result};
use crate::runtime::{FieldBinding, FieldOwner, ResourceBinding};

/// The reconciliation controller synthesized for one API.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedController {
    /// Kind the controller manages
    pub kind: String,
    /// Rust module identifier, shared with the API module
    pub module: String,
    /// Provider resource type
    pub resource_type: String,
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Field table, sorted by provider key
    pub fields: Vec<FieldBinding>,
    /// Rendered Rust module
    pub source: String,
}

impl GeneratedController {
    /// The runtime binding equivalent to the rendered `binding()` function
    pub fn binding(&self) -> ResourceBinding {
        self.fields.iter().cloned().fold(
            ResourceBinding::new(&self.kind, &self.resource_type, &self.group, &self.version),
            ResourceBinding::field,
        )
    }
}

/// Bind every top-level attribute of `api` to its owner and render the
/// controller module.
///
/// Fails with [`GenerateError::Binding`] if the API's field lists are
/// inconsistent (a key bound twice with different field names, or a
/// field without a mapping).
pub fn synthesize_controller(api: &GeneratedApi) -> Result<GeneratedController> {
    let mut keys = BTreeSet::new();
    let mut fields = Vec::new();
    for (mapping, owner) in api.owners() {
        if mapping.serialization_key.is_empty() || mapping.field_name.is_empty() {
            return Err(GenerateError::binding(
                &api.kind,
                format!("attribute '{}' has no field mapping", mapping.path),
            ));
        }
        if !keys.insert(mapping.serialization_key.clone()) {
            return Err(GenerateError::binding(
                &api.kind,
                format!("key '{}' is bound more than once", mapping.serialization_key),
            ));
        }
        let mut binding = FieldBinding::new(
            mapping.field_name.trim_start_matches("r#"),
            &mapping.serialization_key,
            owner,
        );
        binding.set_semantics = mapping.set_semantics;
        binding.sensitive = mapping.sensitive;
        binding.computed = mapping.computed;
        fields.push(binding);
    }

    // Every status field must be reachable through the table.
    for mapping in &api.status_fields {
        if !keys.contains(&mapping.serialization_key) {
            return Err(GenerateError::binding(
                &api.kind,
                format!("status field '{}' is unbound", mapping.path),
            ));
        }
    }

    let data = ControllerTemplateData {
        kind: api.kind.clone(),
        group: api.group.clone(),
        version: api.version.clone(),
        resource_type: api.resource_type.clone(),
        api_path: api.api_path.clone(),
        spec_fields: api.spec_fields.iter().map(|m| m.field_name.clone()).collect(),
        status_fields: api
            .status_fields
            .iter()
            .filter(|m| !m.sensitive)
            .map(|m| m.field_name.clone())
            .collect(),
        bindings: fields.iter().map(binding_expr).collect(),
    };
    let source = render(&data, &format!("controller for {}", api.kind))?;

    Ok(GeneratedController {
        kind: api.kind.clone(),
        module: api.module.clone(),
        resource_type: api.resource_type.clone(),
        group: api.group.clone(),
        version: api.version.clone(),
        fields,
        source,
    })
}

/// Render the controller registry for the given controllers
pub fn render_controllers_mod(
    group: &str,
    version: &str,
    controllers: &[GeneratedController],
) -> Result<String> {
    let data = ControllersModTemplateData {
        group: group.to_string(),
        version: version.to_string(),
        kinds: controllers
            .iter()
            .map(|c| KindEntry {
                kind: c.kind.clone(),
                module: c.module.clone(),
            })
            .collect(),
    };
    render(&data, "controllers/mod.rs")
}

/// Rust expression constructing `binding`
fn binding_expr(binding: &FieldBinding) -> String {
    let owner = match binding.owner {
        FieldOwner::Spec => "FieldOwner::Spec",
        FieldOwner::Status => "FieldOwner::Status",
    };
    let mut expr = format!(
        "FieldBinding::new({:?}, {:?}, {owner})",
        binding.field, binding.key
    );
    if binding.set_semantics {
        expr.push_str(".with_set_semantics()");
    }
    if binding.sensitive {
        expr.push_str(".with_sensitive()");
    }
    if binding.computed {
        expr.push_str(".with_computed()");
    }
    expr
}
