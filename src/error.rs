//! Error types for schema loading, synthesis and emission.
//!
//! Every variant is fatal to a generation run: the pipeline synthesizes all
//! resource kinds before anything is written, so an error here means no
//! artifacts were emitted (or, for [`GenerateError::Write`], that the failing
//! kind's unit was rolled back).

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the generation pipeline.
pub type Result<T, E = GenerateError> = std::result::Result<T, E>;

/// Generation-time error taxonomy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerateError {
    /// The provider descriptor is malformed, inconsistent or nested too deeply.
    #[error("schema load error: {0}")]
    SchemaLoad(String),

    /// A schema construct the type mapper cannot translate.
    #[error("unsupported schema kind '{kind}' at '{path}'")]
    UnsupportedSchemaKind {
        /// Dotted attribute path from the resource root
        path: String,
        /// The kind as declared by the provider
        kind: String,
    },

    /// A numeric attribute would be narrowed by the selected target type.
    #[error("numeric precision violation at '{path}': {reason}")]
    NumericPrecision {
        /// Dotted attribute path from the resource root
        path: String,
        /// Why the target type cannot represent the declared range
        reason: String,
    },

    /// API and controller synthesis disagree; indicates a generator bug.
    #[error("binding error for kind '{kind}': {reason}")]
    Binding {
        /// Resource kind being bound
        kind: String,
        /// What was inconsistent
        reason: String,
    },

    /// Rendering an artifact (askama template or YAML manifest) failed.
    #[error("template error rendering {artifact}: {source}")]
    Template {
        /// Artifact that was being rendered
        artifact: String,
        /// Underlying renderer error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Filesystem failure while emitting an artifact.
    #[error("write error at {}: {source}", path.display())]
    Write {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid generator options or configuration file.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GenerateError {
    /// Create a schema load error with the given message
    pub fn schema_load(msg: impl Into<String>) -> Self {
        Self::SchemaLoad(msg.into())
    }

    /// Create a binding error for a kind
    pub fn binding(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Binding {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a rendering failure for `artifact`
    pub fn template<E>(artifact: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Template {
            artifact: artifact.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an I/O error with the path it occurred on
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
