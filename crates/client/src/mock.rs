use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use opsdeck_core::{FieldValue, ResourceRef};

use crate::error::RemoteError;
use crate::traits::{RemoteDirectory, ResourceEntity};

/// In-memory directory: demo-mode backend and test double in one.
///
/// Holds entities and member sets behind a mutex so it can be shared across
/// worker threads like the live client. Supports failure injection for
/// exercising the executor's per-item error policy.
#[derive(Default)]
pub struct MockDirectory {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entities: BTreeMap<ResourceRef, ResourceEntity>,
    membership: BTreeMap<ResourceRef, Vec<ResourceRef>>,
    fail_members: BTreeSet<ResourceRef>,
    unsupported_clears: BTreeSet<String>,
    mutation_calls: usize,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(
        &self,
        target: ResourceRef,
        name: &str,
        fields: impl IntoIterator<Item = (&'static str, FieldValue)>,
    ) {
        let entity = ResourceEntity {
            target: target.clone(),
            name: name.to_string(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.lock().entities.insert(target, entity);
    }

    pub fn set_members(&self, container: ResourceRef, members: Vec<ResourceRef>) {
        self.lock().membership.insert(container, members);
    }

    /// Drop an entity entirely, simulating deletion behind our back.
    pub fn remove(&self, target: &ResourceRef) {
        let mut inner = self.lock();
        inner.entities.remove(target);
        inner.membership.remove(target);
    }

    /// Make every membership mutation touching `member` fail with a 502.
    pub fn fail_member(&self, member: ResourceRef) {
        self.lock().fail_members.insert(member);
    }

    /// Make `clear_field` on the named field report `Unsupported`.
    pub fn deny_clear(&self, field: &str) {
        self.lock().unsupported_clears.insert(field.to_string());
    }

    pub fn members(&self, container: &ResourceRef) -> Vec<ResourceRef> {
        self.lock()
            .membership
            .get(container)
            .cloned()
            .unwrap_or_default()
    }

    pub fn field(&self, target: &ResourceRef, key: &str) -> FieldValue {
        self.lock()
            .entities
            .get(target)
            .map(|e| e.field(key))
            .unwrap_or(FieldValue::Absent)
    }

    /// Total mutation calls seen. Lets tests prove a code path was read-only.
    pub fn mutation_calls(&self) -> usize {
        self.lock().mutation_calls
    }
}

impl Inner {
    fn require(&self, target: &ResourceRef) -> Result<&ResourceEntity, RemoteError> {
        self.entities
            .get(target)
            .ok_or_else(|| RemoteError::NotFound(target.to_string()))
    }
}

impl RemoteDirectory for MockDirectory {
    fn get(&self, target: &ResourceRef) -> Result<ResourceEntity, RemoteError> {
        let inner = self.lock();
        inner.require(target).cloned()
    }

    fn list_members(&self, container: &ResourceRef) -> Result<Vec<ResourceRef>, RemoteError> {
        let inner = self.lock();
        inner.require(container)?;
        Ok(inner.membership.get(container).cloned().unwrap_or_default())
    }

    fn add_members(
        &self,
        container: &ResourceRef,
        members: &[ResourceRef],
    ) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.mutation_calls += 1;
        inner.require(container)?;
        for member in members {
            if inner.fail_members.contains(member) {
                return Err(RemoteError::Status {
                    code: 502,
                    message: format!("injected failure for {member}"),
                });
            }
            inner.require(member)?;
            let set = inner.membership.entry(container.clone()).or_default();
            if !set.contains(member) {
                set.push(member.clone());
            }
        }
        Ok(())
    }

    fn remove_members(
        &self,
        container: &ResourceRef,
        members: &[ResourceRef],
    ) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.mutation_calls += 1;
        inner.require(container)?;
        for member in members {
            if inner.fail_members.contains(member) {
                return Err(RemoteError::Status {
                    code: 502,
                    message: format!("injected failure for {member}"),
                });
            }
            if let Some(set) = inner.membership.get_mut(container) {
                set.retain(|m| m != member);
            }
        }
        Ok(())
    }

    fn patch_field(
        &self,
        target: &ResourceRef,
        field: &str,
        value: &FieldValue,
    ) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.mutation_calls += 1;
        inner.require(target)?;
        if let Some(entity) = inner.entities.get_mut(target) {
            entity.fields.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    fn clear_field(&self, target: &ResourceRef, field: &str) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.mutation_calls += 1;
        if inner.unsupported_clears.contains(field) {
            return Err(RemoteError::Unsupported(format!(
                "field '{field}' cannot be cleared"
            )));
        }
        inner.require(target)?;
        if let Some(entity) = inner.entities.get_mut(target) {
            entity.fields.remove(field);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MockDirectory {
        let dir = MockDirectory::new();
        dir.insert(ResourceRef::user("u1"), "Alice", [("title", FieldValue::Text("Agent".into()))]);
        dir.insert(ResourceRef::user("u2"), "Bob", []);
        dir.insert(ResourceRef::group("g1"), "Support", []);
        dir.set_members(ResourceRef::group("g1"), vec![ResourceRef::user("u1")]);
        dir
    }

    #[test]
    fn membership_add_remove() {
        let dir = seeded();
        let g = ResourceRef::group("g1");
        dir.add_members(&g, &[ResourceRef::user("u2")]).unwrap();
        assert_eq!(dir.members(&g).len(), 2);
        dir.remove_members(&g, &[ResourceRef::user("u1")]).unwrap();
        assert_eq!(dir.members(&g), vec![ResourceRef::user("u2")]);
    }

    #[test]
    fn missing_member_is_not_found() {
        let dir = seeded();
        let err = dir
            .add_members(&ResourceRef::group("g1"), &[ResourceRef::user("ghost")])
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn injected_failure_reported_as_status() {
        let dir = seeded();
        dir.fail_member(ResourceRef::user("u2"));
        let err = dir
            .add_members(&ResourceRef::group("g1"), &[ResourceRef::user("u2")])
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status { code: 502, .. }));
    }

    #[test]
    fn denied_clear_is_unsupported() {
        let dir = seeded();
        dir.deny_clear("proficiency");
        let err = dir
            .clear_field(&ResourceRef::user("u1"), "proficiency")
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unsupported(_)));
    }

    #[test]
    fn reads_do_not_count_as_mutations() {
        let dir = seeded();
        let _ = dir.get(&ResourceRef::user("u1")).unwrap();
        let _ = dir.list_members(&ResourceRef::group("g1")).unwrap();
        assert_eq!(dir.mutation_calls(), 0);
    }
}
