//! Pre-mutation state capture.
//!
//! Capture is read-only and fail-fast: if the target cannot be read in full,
//! the whole operation aborts before any mutation is dispatched. The captured
//! snapshot must be appended to the record store before the executor runs.

use std::collections::BTreeMap;

use opsdeck_client::RemoteDirectory;
use opsdeck_core::{ChangeSpec, ResourceRef, ResourceState, now_ms};

use crate::error::EngineError;

/// Snapshot the full current member set of a container.
pub fn capture_membership(
    remote: &dyn RemoteDirectory,
    target: &ResourceRef,
) -> Result<ResourceState, EngineError> {
    let members = remote
        .list_members(target)
        .map_err(|e| EngineError::remote_fetch(target, e))?;
    Ok(ResourceState::membership_snapshot(
        target.clone(),
        now_ms(),
        members,
    ))
}

/// Snapshot the named fields of an entity. Fields the entity does not carry
/// are captured as `FieldValue::Absent`, never omitted, so a later rollback
/// can distinguish restore-to-empty from restore-to-value.
pub fn capture_fields(
    remote: &dyn RemoteDirectory,
    target: &ResourceRef,
    names: &[String],
) -> Result<ResourceState, EngineError> {
    let entity = remote
        .get(target)
        .map_err(|e| EngineError::remote_fetch(target, e))?;
    let mut fields = BTreeMap::new();
    for name in names {
        fields.insert(name.clone(), entity.field(name));
    }
    Ok(ResourceState::field_snapshot(target.clone(), now_ms(), fields))
}

/// Capture exactly the state a given change would disturb.
pub fn capture_before_state(
    remote: &dyn RemoteDirectory,
    target: &ResourceRef,
    change: &ChangeSpec,
) -> Result<ResourceState, EngineError> {
    match change {
        ChangeSpec::AddMembers(_) | ChangeSpec::RemoveMembers(_) => {
            capture_membership(remote, target)
        }
        ChangeSpec::PatchFields(fields) => {
            let names: Vec<String> = fields.keys().cloned().collect();
            capture_fields(remote, target, &names)
        }
    }
}
