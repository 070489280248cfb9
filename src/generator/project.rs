use std::path::Path;
use tracing::info;

use super::api::{synthesize_apis, ApiSet};
use super::controller::{render_controllers_mod, synthesize_controller, GeneratedController};
use crate::config::GeneratorOptions;
use crate::emit::{Artifact, ArtifactSet, ArtifactUnit, EmissionWriter, WriteReport};
use crate::error::Result;
use crate::schema::{self, ProviderSchema};

/// Everything synthesized for one provider, before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// APIs plus the shared API modules
    pub apis: ApiSet,
    /// One controller per API, in the same order
    pub controllers: Vec<GeneratedController>,
    /// Rendered controller registry
    pub controllers_mod: String,
}

impl Generation {
    /// Lay the generated sources out under the option paths.
    ///
    /// Per kind: `<apis_path>/<module>.rs`, `<controller_path>/<module>.rs`
    /// and `<crds_path>/<group>_<plural>.yaml`. Registries:
    /// `<apis_path>/mod.rs`, `<apis_path>/common.rs` and
    /// `<controller_path>/mod.rs`.
    pub fn artifacts(&self, options: &GeneratorOptions) -> ArtifactSet {
        let units = self
            .apis
            .apis
            .iter()
            .zip(&self.controllers)
            .map(|(api, controller)| {
                let stem = api.file_stem();
                ArtifactUnit {
                    kind: api.kind.clone(),
                    files: vec![
                        Artifact::new(options.apis_path.join(format!("{stem}.rs")), &api.source),
                        Artifact::new(
                            options.controller_path.join(format!("{stem}.rs")),
                            &controller.source,
                        ),
                        Artifact::new(options.crds_path.join(api.crd_file_name()), &api.crd),
                    ],
                }
            })
            .collect();
        ArtifactSet {
            units,
            registries: vec![
                Artifact::new(options.apis_path.join("common.rs"), &self.apis.common),
                Artifact::new(options.apis_path.join("mod.rs"), &self.apis.registry),
                Artifact::new(options.controller_path.join("mod.rs"), &self.controllers_mod),
            ],
        }
    }
}

/// Synthesize APIs and controllers for every resource of `schema`.
pub fn synthesize(schema: &ProviderSchema, options: &GeneratorOptions) -> Result<Generation> {
    let apis = synthesize_apis(schema, options)?;
    let controllers = apis
        .apis
        .iter()
        .map(synthesize_controller)
        .collect::<Result<Vec<_>>>()?;
    let controllers_mod = render_controllers_mod(&apis.group, &apis.version, &controllers)?;
    Ok(Generation {
        apis,
        controllers,
        controllers_mod,
    })
}

/// Synthesize and write all artifacts for `schema`.
///
/// Every kind is synthesized before the first file is written; any
/// synthesis error leaves the output directories untouched.
pub fn generate(schema: &ProviderSchema, options: &GeneratorOptions) -> Result<WriteReport> {
    let generation = synthesize(schema, options)?;
    let set = generation.artifacts(options);
    let report = EmissionWriter::new(options.force, options.dry_run).write(&set)?;
    info!(
        provider = %options.provider,
        group = %generation.apis.group,
        kinds = generation.apis.apis.len(),
        created = report.created.len(),
        updated = report.updated.len(),
        unchanged = report.unchanged.len(),
        dry_run = options.dry_run,
        "Generation complete"
    );
    Ok(report)
}

/// Load a provider schema descriptor and [`generate`] from it
pub fn generate_from_file(schema_path: &Path, options: &GeneratorOptions) -> Result<WriteReport> {
    let schema = schema::load_file(schema_path, Some(options.schema_provider()))?;
    generate(&schema, options)
}
