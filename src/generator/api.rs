use std::collections::BTreeSet;
use tracing::{debug, info};

use super::crd;
use super::templates::{
    doc_lines, render, uses_btreeset, ApiTemplateData, ApisModTemplateData, CommonTemplateData,
    FieldView, KindEntry, StructView,
};
use crate::config::GeneratorOptions;
use crate::error::{GenerateError, Result};
use crate::mapper::{
    kind_for_resource, plural_for_kind, sanitize_field_name, to_snake_case, NestedType,
    TypeMapper, TypeMapping,
};
use crate::runtime::{FieldOwner, TERMINATION_POLICY_KEY};
use crate::schema::{ProviderSchema, ResourceSchema};

/// Status keys written by the runtime; provider attributes may not use them
pub const STATUS_RESERVED_KEYS: &[&str] = &[
    "observedGeneration",
    "phase",
    "conditions",
    "externalID",
    "specHash",
    "appliedDigests",
    "retryCount",
    "stalledHash",
];

const STATUS_RESERVED_FIELDS: &[&str] = &[
    "observed_generation",
    "phase",
    "conditions",
    "external_id",
    "spec_hash",
    "applied_digests",
    "retry_count",
    "stalled_hash",
];

const SPEC_RESERVED_FIELDS: &[&str] = &["termination_policy"];

/// The API definition synthesized for one provider resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedApi {
    /// Kind name (`Alert`)
    pub kind: String,
    /// Lower-case plural (`alerts`)
    pub plural: String,
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Provider resource type (`wavefront_alert`)
    pub resource_type: String,
    /// Rust module identifier (`alert`, or `r#type` for keywords)
    pub module: String,
    /// Rust path of the API version module the kind is registered in
    pub api_path: String,
    /// Resource documentation
    pub description: Option<String>,
    /// Spec-owned attributes, in attribute order
    pub spec_fields: Vec<TypeMapping>,
    /// Computed attributes reported in Status, in attribute order.
    ///
    /// Includes computed+optional attributes that are also in the Spec, and
    /// sensitive ones that are tracked but never rendered into Status.
    pub status_fields: Vec<TypeMapping>,
    /// Nested block types
    pub nested: Vec<NestedType>,
    /// Rendered Rust module
    pub source: String,
    /// Rendered CRD manifest
    pub crd: String,
}

impl GeneratedApi {
    /// File stem shared by the API and controller modules
    pub fn file_stem(&self) -> &str {
        self.module.trim_start_matches("r#")
    }

    /// Name of the CRD manifest file (`<group>_<plural>.yaml`)
    pub fn crd_file_name(&self) -> String {
        format!("{}_{}.yaml", self.group, self.plural)
    }

    /// Owner of every top-level attribute, in attribute order.
    ///
    /// Computed+optional attributes appear in both field lists but are owned
    /// by the Spec.
    pub fn owners(&self) -> Vec<(&TypeMapping, FieldOwner)> {
        let spec_keys: BTreeSet<&str> = self
            .spec_fields
            .iter()
            .map(|m| m.serialization_key.as_str())
            .collect();
        let mut owners: Vec<(&TypeMapping, FieldOwner)> = self
            .spec_fields
            .iter()
            .map(|m| (m, FieldOwner::Spec))
            .chain(
                self.status_fields
                    .iter()
                    .filter(|m| !spec_keys.contains(m.serialization_key.as_str()))
                    .map(|m| (m, FieldOwner::Status)),
            )
            .collect();
        owners.sort_by(|a, b| a.0.serialization_key.cmp(&b.0.serialization_key));
        owners
    }
}

/// Every API of one provider plus the shared modules.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSet {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// One API per resource type, sorted by kind
    pub apis: Vec<GeneratedApi>,
    /// Rendered registry module (`mod.rs`)
    pub registry: String,
    /// Rendered shared status types module (`common.rs`)
    pub common: String,
}

impl ApiSet {
    /// Look up an API by kind
    pub fn api(&self, kind: &str) -> Option<&GeneratedApi> {
        self.apis.iter().find(|a| a.kind == kind)
    }
}

/// Synthesize the API of every (non-skipped) resource in `schema`.
///
/// Pure: nothing is written. The output depends only on the inputs, so the
/// same schema and options always render byte-identical artifacts.
pub fn synthesize_apis(schema: &ProviderSchema, options: &GeneratorOptions) -> Result<ApiSet> {
    options.validate()?;
    let group = options.group();

    let mut kinds = BTreeSet::new();
    let mut modules = BTreeSet::new();
    let mut apis = Vec::new();
    for resource in &schema.resources {
        if options.skip.contains(&resource.name) {
            info!(resource = %resource.name, "Skipping resource (config skip list)");
            continue;
        }
        let kind = options
            .kind_overrides
            .get(&resource.name)
            .cloned()
            .unwrap_or_else(|| kind_for_resource(&schema.name, &resource.name));
        if !kinds.insert(kind.clone()) {
            return Err(GenerateError::config(format!(
                "resource '{}' maps to kind '{kind}', which another resource already uses",
                resource.name
            )));
        }
        let api = synthesize_api(resource, &kind, &group, options)?;
        if !modules.insert(api.file_stem().to_string()) {
            return Err(GenerateError::config(format!(
                "kind '{kind}' maps to module '{}', which another kind already uses",
                api.file_stem()
            )));
        }
        apis.push(api);
    }
    apis.sort_by(|a, b| a.kind.cmp(&b.kind));

    let entries = kind_entries(&apis);
    let registry = render(
        &ApisModTemplateData {
            group: group.clone(),
            version: options.version.clone(),
            kinds: entries,
        },
        "apis/mod.rs",
    )?;
    let common = render(
        &CommonTemplateData {
            group: group.clone(),
            version: options.version.clone(),
        },
        "apis/common.rs",
    )?;

    Ok(ApiSet {
        group,
        version: options.version.clone(),
        apis,
        registry,
        common,
    })
}

/// Synthesize the API for a single resource under the given kind name.
pub fn synthesize_api(
    resource: &ResourceSchema,
    kind: &str,
    group: &str,
    options: &GeneratorOptions,
) -> Result<GeneratedApi> {
    let mut mapper = TypeMapper::new(kind, options.numeric_policy);
    let root = &resource.name;

    let spec_attrs = resource
        .attributes
        .iter()
        .filter(|(_, attr)| !attr.is_status_only());
    let spec_fields = mapper.map_fields(spec_attrs, root, SPEC_RESERVED_FIELDS)?;
    if let Some(clash) = spec_fields
        .iter()
        .find(|m| m.serialization_key == TERMINATION_POLICY_KEY)
    {
        return Err(GenerateError::binding(
            kind,
            format!("attribute '{}' collides with the termination policy field", clash.path),
        ));
    }

    let status_attrs = resource.attributes.iter().filter(|(_, attr)| attr.computed);
    let status_fields = mapper.map_fields(status_attrs, root, STATUS_RESERVED_FIELDS)?;
    if let Some(clash) = status_fields
        .iter()
        .find(|m| STATUS_RESERVED_KEYS.contains(&m.serialization_key.as_str()))
    {
        return Err(GenerateError::binding(
            kind,
            format!("attribute '{}' collides with a reserved status field", clash.path),
        ));
    }

    let nested = mapper.into_nested_types();
    debug!(
        kind = %kind,
        spec = spec_fields.len(),
        status = status_fields.len(),
        nested = nested.len(),
        "Mapped resource attributes"
    );

    let mut api = GeneratedApi {
        kind: kind.to_string(),
        plural: plural_for_kind(kind),
        group: group.to_string(),
        version: options.version.clone(),
        resource_type: resource.name.clone(),
        module: sanitize_field_name(&to_snake_case(kind)),
        api_path: options.api_module_path(),
        description: resource.description.clone(),
        spec_fields,
        status_fields,
        nested,
        source: String::new(),
        crd: String::new(),
    };
    api.source = render_api(&api)?;
    api.crd = crd::render_crd(&api)?;
    Ok(api)
}

fn render_api(api: &GeneratedApi) -> Result<String> {
    let visible_status: Vec<&TypeMapping> =
        api.status_fields.iter().filter(|m| !m.sensitive).collect();
    let all_types = api
        .spec_fields
        .iter()
        .chain(visible_status.iter().copied())
        .chain(api.nested.iter().flat_map(|n| n.fields.iter()))
        .map(|m| &m.field_type);
    let (mut btreeset, mut arbitrary) = (false, false);
    for ty in all_types {
        btreeset |= uses_btreeset(ty);
        arbitrary |= ty.uses_arbitrary_precision();
    }

    let docs = api
        .description
        .as_deref()
        .map(|d| doc_lines(&d.lines().collect::<Vec<_>>()))
        .unwrap_or_default();

    let data = ApiTemplateData {
        kind: api.kind.clone(),
        group: api.group.clone(),
        version: api.version.clone(),
        plural: api.plural.clone(),
        resource_type: api.resource_type.clone(),
        docs,
        spec_fields: api.spec_fields.iter().map(FieldView::from_mapping).collect(),
        status_fields: visible_status
            .iter()
            .map(|m| FieldView::from_mapping(m))
            .collect(),
        nested: api
            .nested
            .iter()
            .map(|n| StructView {
                name: n.name.clone(),
                docs: vec![format!(" Nested block `{}`.", n.path)],
                fields: n.fields.iter().map(FieldView::from_mapping).collect(),
            })
            .collect(),
        uses_btreeset: btreeset,
        arbitrary_precision: arbitrary,
    };
    render(&data, &format!("api module for {}", api.kind))
}

/// Registry entries for a set of APIs, in the given order
pub fn kind_entries(apis: &[GeneratedApi]) -> Vec<KindEntry> {
    apis.iter()
        .map(|a| KindEntry {
            kind: a.kind.clone(),
            module: a.module.clone(),
        })
        .collect()
}
