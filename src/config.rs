//! # Configuration
//!
//! Three layers feed the tool:
//!
//! - [`GeneratorOptions`] is the fully resolved input of one generation run.
//! - [`GeneratorConfig`] is the optional `kubeform.toml` file that sits next
//!   to the provider schema (or is passed with `--config`). It supplies
//!   defaults for the options plus per-resource kind overrides and a skip
//!   list. Command-line flags win over the file.
//! - [`ReconcilerConfig`] tunes the runtime and is read from the environment.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `KUBEFORM_OUTPUT_ROOT` | `.` | Root for default output paths |
//! | `KUBEFORM_WORKERS` | `4` | Concurrent reconciliation workers |
//! | `KUBEFORM_DRIFT_INTERVAL_SECS` | `300` | Ready-state drift check period |
//! | `KUBEFORM_BACKOFF_INITIAL_MS` | `500` | First retry delay |
//! | `KUBEFORM_BACKOFF_MAX_SECS` | `300` | Retry delay ceiling |
//! | `KUBEFORM_BACKOFF_MULTIPLIER` | `2.0` | Growth factor between retries |
//!
//! ## Example `kubeform.toml`
//!
//! ```toml
//! provider = "wavefront"
//! version = "v1alpha1"
//! numeric_policy = "lossless"
//! api_crate = "provider_wavefront_api"
//! skip = ["wavefront_user"]
//!
//! [kinds]
//! wavefront_cloud_integration_aws = "AwsIntegration"
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GenerateError, Result};
use crate::mapper::NumericPolicy;
use crate::runtime::Backoff;

/// Name of the auto-detected configuration file
pub const CONFIG_FILE_NAME: &str = "kubeform.toml";

/// Default API version of generated kinds
pub const DEFAULT_VERSION: &str = "v1alpha1";

/// Default DNS suffix of generated API groups
pub const DEFAULT_GROUP_DOMAIN: &str = "kubeform.com";

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^v[1-9][0-9]*((alpha|beta)[1-9][0-9]*)?$").unwrap()
});

static DNS_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap()
});

static RUST_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$").unwrap()
});

/// Resolved inputs of a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorOptions {
    /// Provider name used for the API group and kind prefix stripping
    pub provider: String,
    /// Provider entry to select from the schema document, when it differs
    pub provider_original: Option<String>,
    /// API version of every generated kind
    pub version: String,
    /// DNS suffix appended to the provider name to form the API group
    pub group_domain: String,
    /// Rust path of the crate holding the API modules; generated
    /// controllers import their kind's types from it
    pub api_crate: Option<String>,
    /// Directory receiving API modules
    pub apis_path: PathBuf,
    /// Directory receiving controller modules
    pub controller_path: PathBuf,
    /// Directory receiving CRD manifests
    pub crds_path: PathBuf,
    /// Numeric representation policy
    pub numeric_policy: NumericPolicy,
    /// Overwrite user-owned files that carry no generated markers
    pub force: bool,
    /// Report what would change without touching disk
    pub dry_run: bool,
    /// Resource type → kind name overrides
    pub kind_overrides: BTreeMap<String, String>,
    /// Resource types to leave out
    pub skip: BTreeSet<String>,
}

impl GeneratorOptions {
    /// Options for `provider` with every path at its default under `output_root`
    pub fn new(provider: impl Into<String>, output_root: &Path) -> Self {
        let provider = provider.into();
        let (apis_path, controller_path, crds_path) =
            default_paths(output_root, &provider, DEFAULT_VERSION);
        Self {
            provider,
            provider_original: None,
            version: DEFAULT_VERSION.to_string(),
            group_domain: DEFAULT_GROUP_DOMAIN.to_string(),
            api_crate: None,
            apis_path,
            controller_path,
            crds_path,
            numeric_policy: NumericPolicy::default(),
            force: false,
            dry_run: false,
            kind_overrides: BTreeMap::new(),
            skip: BTreeSet::new(),
        }
    }

    /// API group of every generated kind (`wavefront.kubeform.com`)
    pub fn group(&self) -> String {
        format!("{}.{}", self.provider, self.group_domain)
    }

    /// Crate of the API modules, `provider_<name>_api` unless overridden
    pub fn api_crate(&self) -> String {
        self.api_crate
            .clone()
            .unwrap_or_else(|| format!("provider_{}_api", self.provider.replace('-', "_")))
    }

    /// Rust path of the API version module (`provider_wavefront_api::apis::v1alpha1`)
    pub fn api_module_path(&self) -> String {
        format!("{}::apis::{}", self.api_crate(), self.version)
    }

    /// Provider entry to select from the schema document
    pub fn schema_provider(&self) -> &str {
        self.provider_original.as_deref().unwrap_or(&self.provider)
    }

    /// Reject options that would produce an invalid API group or version.
    pub fn validate(&self) -> Result<()> {
        if !DNS_LABEL_RE.is_match(&self.provider) {
            return Err(GenerateError::config(format!(
                "provider name '{}' is not a lower-case DNS label",
                self.provider
            )));
        }
        if !VERSION_RE.is_match(&self.version) {
            return Err(GenerateError::config(format!(
                "version '{}' is not a Kubernetes API version (e.g. v1alpha1)",
                self.version
            )));
        }
        if self.group_domain.is_empty()
            || !self.group_domain.split('.').all(|l| DNS_LABEL_RE.is_match(l))
        {
            return Err(GenerateError::config(format!(
                "group domain '{}' is not a DNS name",
                self.group_domain
            )));
        }
        if let Some(path) = &self.api_crate {
            if !RUST_PATH_RE.is_match(path) {
                return Err(GenerateError::config(format!(
                    "api crate '{path}' is not a Rust path"
                )));
            }
        }
        for (resource, kind) in &self.kind_overrides {
            let valid = kind.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && kind.chars().all(|c| c.is_ascii_alphanumeric());
            if !valid {
                return Err(GenerateError::config(format!(
                    "kind override '{kind}' for '{resource}' is not a CamelCase identifier"
                )));
            }
        }
        Ok(())
    }
}

/// Default `(apis, controllers, crds)` output directories.
///
/// `<root>/provider-<name>-api/src/apis/<version>`,
/// `<root>/provider-<name>-controller/src/controllers` and
/// `<root>/provider-<name>-api/crds`.
pub fn default_paths(root: &Path, provider: &str, version: &str) -> (PathBuf, PathBuf, PathBuf) {
    let api_crate = root.join(format!("provider-{provider}-api"));
    let controller_crate = root.join(format!("provider-{provider}-controller"));
    (
        api_crate.join("src").join("apis").join(version),
        controller_crate.join("src").join("controllers"),
        api_crate.join("crds"),
    )
}

/// Output root from `KUBEFORM_OUTPUT_ROOT`, defaulting to the working directory
pub fn output_root_from_env() -> PathBuf {
    env::var_os("KUBEFORM_OUTPUT_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Contents of `kubeform.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Provider name
    pub provider: Option<String>,
    /// Provider entry in the schema document
    pub provider_original: Option<String>,
    /// API version
    pub version: Option<String>,
    /// API group domain
    pub group_domain: Option<String>,
    /// Rust path of the API crate
    pub api_crate: Option<String>,
    /// Numeric policy
    pub numeric_policy: Option<NumericPolicy>,
    /// Root for default output paths
    pub output_root: Option<PathBuf>,
    /// API output directory
    pub apis_path: Option<PathBuf>,
    /// Controller output directory
    pub controller_path: Option<PathBuf>,
    /// CRD output directory
    pub crds_path: Option<PathBuf>,
    /// Resource type → kind overrides
    pub kinds: BTreeMap<String, String>,
    /// Resource types to skip
    pub skip: BTreeSet<String>,
}

impl GeneratorConfig {
    /// Parse a configuration document
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| GenerateError::config(e.to_string()))
    }

    /// Load a configuration file.
    ///
    /// Returns `Ok(None)` if the file does not exist and `Err` if it exists
    /// but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GenerateError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&contents).map_err(|e| {
            GenerateError::config(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(config))
    }
}

/// Resolve the configuration file to use.
///
/// Priority:
/// 1. Explicitly provided path (must exist)
/// 2. `kubeform.toml` alongside the schema
/// 3. None
pub fn resolve_config_path(explicit: Option<&Path>, schema_path: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(GenerateError::config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(schema_path
        .parent()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|p| p.exists()))
}

/// Runtime tuning loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    /// Number of concurrent reconciliation workers
    pub workers: usize,
    /// Period of the Ready-state drift check
    pub drift_interval: Duration,
    /// Delay before the first retry
    pub backoff_initial: Duration,
    /// Ceiling on retry delays
    pub backoff_max: Duration,
    /// Growth factor between consecutive retries
    pub backoff_multiplier: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            drift_interval: Duration::from_secs(300),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let workers = parse("KUBEFORM_WORKERS")
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or(defaults.workers);
        let drift_interval = parse("KUBEFORM_DRIFT_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.drift_interval);
        let backoff_initial = parse("KUBEFORM_BACKOFF_INITIAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff_initial);
        let backoff_max = parse("KUBEFORM_BACKOFF_MAX_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.backoff_max);
        let backoff_multiplier = lookup("KUBEFORM_BACKOFF_MULTIPLIER")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|m| m.is_finite() && *m >= 1.0)
            .unwrap_or(defaults.backoff_multiplier);
        Self {
            workers,
            drift_interval,
            backoff_initial,
            backoff_max,
            backoff_multiplier,
        }
    }

    /// Retry policy derived from the backoff settings
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial_delay: self.backoff_initial,
            max_delay: self.backoff_max,
            multiplier: self.backoff_multiplier,
        }
    }
}
