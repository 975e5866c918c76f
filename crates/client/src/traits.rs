use std::collections::BTreeMap;

use opsdeck_core::{FieldValue, ResourceRef};

use crate::error::RemoteError;

/// A remote entity as returned by `RemoteDirectory::get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntity {
    pub target: ResourceRef,
    pub name: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl ResourceEntity {
    pub fn field(&self, key: &str) -> FieldValue {
        self.fields.get(key).cloned().unwrap_or(FieldValue::Absent)
    }
}

/// Authenticated access to the contact-center platform's resources.
///
/// Backends are swappable: the live HTTP client and the in-memory demo
/// directory both implement this. All calls are synchronous with a bounded
/// per-call timeout; implementations own their retry policy.
pub trait RemoteDirectory: Send + Sync {
    /// Fetch a single entity. `NotFound` if it does not exist.
    fn get(&self, target: &ResourceRef) -> Result<ResourceEntity, RemoteError>;

    /// Full member set of a container, paginating until exhausted.
    /// `NotFound` if the container itself is gone.
    fn list_members(&self, container: &ResourceRef) -> Result<Vec<ResourceRef>, RemoteError>;

    fn add_members(
        &self,
        container: &ResourceRef,
        members: &[ResourceRef],
    ) -> Result<(), RemoteError>;

    fn remove_members(
        &self,
        container: &ResourceRef,
        members: &[ResourceRef],
    ) -> Result<(), RemoteError>;

    fn patch_field(
        &self,
        target: &ResourceRef,
        field: &str,
        value: &FieldValue,
    ) -> Result<(), RemoteError>;

    /// Remove a field entirely. Returns `Unsupported` where the platform
    /// offers no way to clear the field.
    fn clear_field(&self, target: &ResourceRef, field: &str) -> Result<(), RemoteError>;
}
