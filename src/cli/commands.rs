use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::{
    default_paths, output_root_from_env, resolve_config_path, GeneratorConfig, GeneratorOptions,
    DEFAULT_GROUP_DOMAIN, DEFAULT_VERSION,
};
use crate::emit::WriteReport;
use crate::generator::{generate, synthesize_apis};
use crate::mapper::NumericPolicy;
use crate::schema::{self, ProviderSchema};

/// Command-line interface for kubeform
///
/// Generates Kubernetes API types, CRDs and reconciliation controllers from
/// an infrastructure provider's schema.
#[derive(Parser, Debug)]
#[command(name = "kubeform-gen", version)]
#[command(about = "Generate Kubernetes APIs and controllers from provider schemas", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate API modules, CRDs and controllers for every provider resource
    Generate(GenerateArgs),
    /// List the provider's resources with their kind and Spec/Status partition
    Inspect {
        /// Provider schema descriptor (`terraform providers schema -json` output)
        #[arg(short, long)]
        schema: PathBuf,

        /// Provider to select when the descriptor holds several
        #[arg(short, long)]
        provider: Option<String>,

        /// Print the listing as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Flags of `generate`; unset flags fall back to `kubeform.toml`, then defaults
#[derive(Args, Debug, Clone, PartialEq)]
pub struct GenerateArgs {
    /// Provider schema descriptor (JSON, or YAML by extension)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Provider name: API group prefix and kind prefix to strip
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Provider entry to read from the descriptor, when it differs from --provider
    #[arg(long)]
    pub provider_original: Option<String>,

    /// API version of the generated kinds (e.g. v1alpha1)
    #[arg(long)]
    pub version: Option<String>,

    /// Output directory for API modules
    #[arg(long)]
    pub apis_path: Option<PathBuf>,

    /// Output directory for controller modules
    #[arg(long)]
    pub controller_path: Option<PathBuf>,

    /// Output directory for CRD manifests
    #[arg(long)]
    pub crds_path: Option<PathBuf>,

    /// Configuration file (default: kubeform.toml next to the schema)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Numeric representation: lossless or float64
    #[arg(long)]
    pub numeric_policy: Option<NumericPolicy>,

    /// Overwrite files that exist without generated markers
    #[arg(short, long, default_value_t = false)]
    pub force: bool,

    /// Show what would change without writing files
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl GenerateArgs {
    /// Load the configuration file, if any
    pub fn load_config(&self) -> anyhow::Result<GeneratorConfig> {
        let Some(path) = resolve_config_path(self.config.as_deref(), &self.schema)? else {
            return Ok(GeneratorConfig::default());
        };
        let config = GeneratorConfig::load(&path)?.unwrap_or_default();
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Provider entry to select from the descriptor, if one is named
    pub fn schema_selector<'a>(&'a self, config: &'a GeneratorConfig) -> Option<&'a str> {
        self.provider_original
            .as_deref()
            .or(config.provider_original.as_deref())
            .or(self.provider.as_deref())
            .or(config.provider.as_deref())
    }

    /// Merge flags over `config` over defaults.
    ///
    /// `schema_name` is the loaded provider's short name, used when neither
    /// the flags nor the file name a provider.
    pub fn options(&self, config: &GeneratorConfig, schema_name: &str) -> GeneratorOptions {
        let provider = self
            .provider
            .clone()
            .or_else(|| config.provider.clone())
            .unwrap_or_else(|| schema_name.to_string());
        let version = self
            .version
            .clone()
            .or_else(|| config.version.clone())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        let root = config
            .output_root
            .clone()
            .unwrap_or_else(output_root_from_env);
        let (apis, controllers, crds) = default_paths(&root, &provider, &version);

        GeneratorOptions {
            provider_original: self
                .provider_original
                .clone()
                .or_else(|| config.provider_original.clone()),
            group_domain: config
                .group_domain
                .clone()
                .unwrap_or_else(|| DEFAULT_GROUP_DOMAIN.to_string()),
            api_crate: config.api_crate.clone(),
            apis_path: pick(&self.apis_path, &config.apis_path, apis),
            controller_path: pick(&self.controller_path, &config.controller_path, controllers),
            crds_path: pick(&self.crds_path, &config.crds_path, crds),
            numeric_policy: self
                .numeric_policy
                .or(config.numeric_policy)
                .unwrap_or_default(),
            force: self.force,
            dry_run: self.dry_run,
            kind_overrides: config.kinds.clone(),
            skip: config.skip.clone(),
            provider,
            version,
        }
    }
}

fn pick(flag: &Option<PathBuf>, file: &Option<PathBuf>, default: PathBuf) -> PathBuf {
    flag.clone().or_else(|| file.clone()).unwrap_or(default)
}

/// One resource in the `inspect` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectEntry {
    /// Provider resource type
    pub resource: String,
    /// Generated kind
    pub kind: String,
    /// Spec-owned attribute keys
    pub spec: Vec<String>,
    /// Attribute keys reported in Status
    pub status: Vec<String>,
    /// Sensitive attribute keys
    pub sensitive: Vec<String>,
}

/// Build the `inspect` listing for a loaded schema
pub fn inspect(schema: &ProviderSchema) -> anyhow::Result<Vec<InspectEntry>> {
    let options = GeneratorOptions::new(&schema.name, &output_root_from_env());
    let apis = synthesize_apis(schema, &options)?;
    let keys = |fields: &[crate::mapper::TypeMapping]| -> Vec<String> {
        fields.iter().map(|m| m.serialization_key.clone()).collect()
    };
    Ok(apis
        .apis
        .iter()
        .map(|api| InspectEntry {
            resource: api.resource_type.clone(),
            kind: api.kind.clone(),
            spec: keys(&api.spec_fields),
            status: keys(&api.status_fields),
            sensitive: api
                .spec_fields
                .iter()
                .chain(&api.status_fields)
                .filter(|m| m.sensitive)
                .map(|m| m.serialization_key.clone())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect(),
        })
        .collect())
}

/// Execute the parsed command
///
/// # Errors
///
/// Returns an error if the configuration or schema cannot be loaded, if
/// synthesis fails for any resource, or if emission fails. Nothing is
/// written unless every resource synthesizes cleanly.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => {
            let report = run_generate(&args)?;
            print_report(&report, args.dry_run);
            Ok(())
        }
        Commands::Inspect {
            schema,
            provider,
            json,
        } => {
            let loaded = schema::load_file(&schema, provider.as_deref())
                .with_context(|| format!("Failed to load schema {}", schema.display()))?;
            let entries = inspect(&loaded)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!("{} -> {}", entry.resource, entry.kind);
                    println!("  spec:   {}", entry.spec.join(", "));
                    println!("  status: {}", entry.status.join(", "));
                    if !entry.sensitive.is_empty() {
                        println!("  sensitive: {}", entry.sensitive.join(", "));
                    }
                }
            }
            Ok(())
        }
    }
}

/// Resolve options for `args` and run the generation pipeline
pub fn run_generate(args: &GenerateArgs) -> anyhow::Result<WriteReport> {
    let config = args.load_config()?;
    let schema = schema::load_file(&args.schema, args.schema_selector(&config))
        .with_context(|| format!("Failed to load schema {}", args.schema.display()))?;
    let options = args.options(&config, &schema.name);
    let report = generate(&schema, &options).with_context(|| {
        format!(
            "Failed to generate {} for provider '{}'",
            options.group(),
            options.provider
        )
    })?;
    Ok(report)
}

fn print_report(report: &WriteReport, dry_run: bool) {
    let verb = if dry_run { "would be " } else { "" };
    for path in &report.created {
        println!("{verb}created   {}", path.display());
    }
    for path in &report.updated {
        println!("{verb}updated   {}", path.display());
    }
    for path in &report.conflicts {
        println!("conflict  {} (no generated markers; use --force)", path.display());
    }
    println!(
        "{} created, {} updated, {} unchanged",
        report.created.len(),
        report.updated.len(),
        report.unchanged.len()
    );
}
