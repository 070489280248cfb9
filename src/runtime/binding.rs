use serde::{Deserialize, Serialize};

/// Which half of the API object owns an attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldOwner {
    /// User-settable; sent to the provider
    Spec,
    /// Observed only; never sent to the provider
    Status,
}

/// Binds one API field to one provider attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    /// Rust field name in the generated type
    pub field: String,
    /// Provider attribute name (serialization key)
    pub key: String,
    /// Owning half of the object
    pub owner: FieldOwner,
    /// Compare order-insensitively
    pub set_semantics: bool,
    /// Never echo the value into Status
    pub sensitive: bool,
    /// Provider computes the value when unset
    pub computed: bool,
}

impl FieldBinding {
    /// A binding with every flag cleared
    pub fn new(field: impl Into<String>, key: impl Into<String>, owner: FieldOwner) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
            owner,
            set_semantics: false,
            sensitive: false,
            computed: false,
        }
    }

    /// Builder: compare order-insensitively
    pub fn with_set_semantics(mut self) -> Self {
        self.set_semantics = true;
        self
    }

    /// Builder: mark sensitive
    pub fn with_sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Builder: mark computed
    pub fn with_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Whether the observed value belongs in Status
    pub fn is_observed(&self) -> bool {
        (self.owner == FieldOwner::Status || self.computed) && !self.sensitive
    }
}

/// Everything the runtime needs to reconcile one kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// API kind
    pub kind: String,
    /// Provider resource type
    pub resource_type: String,
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Top-level field bindings, in attribute order
    pub fields: Vec<FieldBinding>,
}

impl ResourceBinding {
    /// A binding without fields
    pub fn new(
        kind: impl Into<String>,
        resource_type: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            resource_type: resource_type.into(),
            group: group.into(),
            version: version.into(),
            fields: Vec::new(),
        }
    }

    /// Builder: append a field binding
    pub fn field(mut self, field: FieldBinding) -> Self {
        self.fields.push(field);
        self
    }

    /// `group/version`
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    /// Look up a field by provider attribute name
    pub fn by_key(&self, key: &str) -> Option<&FieldBinding> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Spec-owned fields
    pub fn spec_fields(&self) -> impl Iterator<Item = &FieldBinding> {
        self.fields.iter().filter(|f| f.owner == FieldOwner::Spec)
    }

    /// Status-owned fields
    pub fn status_fields(&self) -> impl Iterator<Item = &FieldBinding> {
        self.fields.iter().filter(|f| f.owner == FieldOwner::Status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_fields_exclude_sensitive_values() {
        let status = FieldBinding::new("id", "id", FieldOwner::Status);
        let mirrored = FieldBinding::new("url", "url", FieldOwner::Spec).with_computed();
        let secret = FieldBinding::new("token", "token", FieldOwner::Status).with_sensitive();
        let plain = FieldBinding::new("name", "name", FieldOwner::Spec);
        assert!(status.is_observed());
        assert!(mirrored.is_observed());
        assert!(!secret.is_observed());
        assert!(!plain.is_observed());
    }

    #[test]
    fn binding_partitions_fields() {
        let binding = ResourceBinding::new("Alert", "wavefront_alert", "wavefront.kubeform.com", "v1alpha1")
            .field(FieldBinding::new("name", "name", FieldOwner::Spec))
            .field(FieldBinding::new("id", "id", FieldOwner::Status));
        assert_eq!(binding.api_version(), "wavefront.kubeform.com/v1alpha1");
        assert_eq!(binding.spec_fields().count(), 1);
        assert_eq!(binding.status_fields().count(), 1);
        assert_eq!(binding.by_key("id").map(|f| f.owner), Some(FieldOwner::Status));
    }
}
