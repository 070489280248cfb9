use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::PluginError;

/// Attribute values keyed by provider attribute name
pub type Attributes = Map<String, Value>;

/// Result of a successful create
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Identifier the provider assigned to the new resource
    pub id: String,
    /// State observed right after creation
    pub observed: Attributes,
}

/// CRUD execution interface of a provider plugin.
///
/// Implementations are shared across every worker of a controller and must
/// not block: one object's outstanding call never holds up another's.
#[async_trait]
pub trait CrudAdapter: Send + Sync {
    /// Create a resource from the given attributes
    async fn create(&self, resource_type: &str, attrs: &Attributes)
        -> Result<Created, PluginError>;

    /// Read the current state; `Ok(None)` means the resource does not exist
    async fn read(&self, resource_type: &str, id: &str)
        -> Result<Option<Attributes>, PluginError>;

    /// Apply only the changed attributes and return the resulting state
    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        changed: &Attributes,
    ) -> Result<Attributes, PluginError>;

    /// Delete the resource; callers treat [`PluginError::NotFound`] as success
    async fn delete(&self, resource_type: &str, id: &str) -> Result<(), PluginError>;
}
