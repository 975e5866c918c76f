//! Inverse derivation and rollback validation.
//!
//! A rollback is an ordinary operation whose change is computed from the
//! original record's captured before-state and the target's *current* state.
//! It runs through the normal capture/persist/execute path and produces its
//! own record, linked to the original via `reverts`.

use std::collections::BTreeMap;

use opsdeck_core::{ChangeSpec, OperationRecord, ResourceRef, TimestampMs};

use crate::error::EngineError;

/// Compute the change that undoes `record`, given the target's current
/// member set (required for membership operations, ignored for patches).
///
/// - `AddMembers(s)` reverses to removing the members of `s` that are
///   currently present. Members that failed to add, or were removed again
///   since, are left alone.
/// - `RemoveMembers(s)` reverses to re-adding the members of `s` that are
///   currently absent.
/// - `PatchFields(f)` reverses to restoring the captured before-value of
///   every field in `f`; a captured `Absent` becomes a field-clear.
pub fn derive_inverse(
    record: &OperationRecord,
    current_members: Option<&[ResourceRef]>,
) -> Result<ChangeSpec, EngineError> {
    match &record.change {
        ChangeSpec::AddMembers(added) => {
            let current = require_members(current_members)?;
            let to_remove = added
                .iter()
                .filter(|m| current.contains(m))
                .cloned()
                .collect();
            Ok(ChangeSpec::remove_members(to_remove))
        }
        ChangeSpec::RemoveMembers(removed) => {
            let current = require_members(current_members)?;
            let to_add = removed
                .iter()
                .filter(|m| !current.contains(m))
                .cloned()
                .collect();
            Ok(ChangeSpec::add_members(to_add))
        }
        ChangeSpec::PatchFields(patched) => {
            let mut restore = BTreeMap::new();
            for name in patched.keys() {
                let before = record
                    .before
                    .fields
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::InvalidChange(format!(
                            "record {} has no captured value for field '{name}'",
                            record.id
                        ))
                    })?;
                restore.insert(name.clone(), before);
            }
            Ok(ChangeSpec::PatchFields(restore))
        }
    }
}

fn require_members(current: Option<&[ResourceRef]>) -> Result<&[ResourceRef], EngineError> {
    current.ok_or_else(|| {
        EngineError::InvalidChange(
            "current membership required to invert a membership operation".into(),
        )
    })
}

/// Reject a rollback that must not run: already rolled back, or captured
/// too long ago without an explicit staleness override.
pub fn validate_rollback(
    record: &OperationRecord,
    threshold_ms: i64,
    override_staleness: bool,
    now: TimestampMs,
) -> Result<(), EngineError> {
    if record.rolled_back_by.is_some() {
        return Err(EngineError::AlreadyRolledBack(record.id));
    }
    if !override_staleness && now - record.before.captured_at > threshold_ms {
        return Err(EngineError::StaleRecord {
            captured_at: record.before.captured_at,
            threshold_ms,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::{FieldValue, OperationId, ResourceState};

    fn membership_record(change: ChangeSpec, before_members: Vec<ResourceRef>) -> OperationRecord {
        let target = ResourceRef::group("g1");
        let before = ResourceState::membership_snapshot(target.clone(), 1_000, before_members);
        OperationRecord::pending(target, change, before)
    }

    #[test]
    fn add_inverse_removes_only_present_members() {
        let record = membership_record(
            ChangeSpec::add_members(vec![ResourceRef::user("u3"), ResourceRef::user("u4")]),
            vec![ResourceRef::user("u1")],
        );
        // u4 never made it in (or was removed since), so only u3 comes out.
        let current = vec![
            ResourceRef::user("u1"),
            ResourceRef::user("u3"),
        ];
        let inverse = derive_inverse(&record, Some(&current)).unwrap();
        assert_eq!(
            inverse,
            ChangeSpec::remove_members(vec![ResourceRef::user("u3")])
        );
    }

    #[test]
    fn remove_inverse_restores_only_absent_members() {
        let record = membership_record(
            ChangeSpec::remove_members(vec![ResourceRef::user("u1"), ResourceRef::user("u2")]),
            vec![ResourceRef::user("u1"), ResourceRef::user("u2")],
        );
        let current = vec![ResourceRef::user("u2")];
        let inverse = derive_inverse(&record, Some(&current)).unwrap();
        assert_eq!(inverse, ChangeSpec::add_members(vec![ResourceRef::user("u1")]));
    }

    #[test]
    fn membership_inverse_needs_current_state() {
        let record = membership_record(
            ChangeSpec::add_members(vec![ResourceRef::user("u1")]),
            vec![],
        );
        assert!(matches!(
            derive_inverse(&record, None),
            Err(EngineError::InvalidChange(_))
        ));
    }

    #[test]
    fn patch_inverse_restores_captured_values() {
        let target = ResourceRef::user("u1");
        let mut before_fields = BTreeMap::new();
        before_fields.insert("title".to_string(), FieldValue::Text("Agent".into()));
        before_fields.insert("proficiency".to_string(), FieldValue::Absent);
        let before = ResourceState::field_snapshot(target.clone(), 1_000, before_fields);
        let record = OperationRecord::pending(
            target,
            ChangeSpec::patch_fields([
                ("title".to_string(), FieldValue::Text("Lead".into())),
                ("proficiency".to_string(), FieldValue::Integer(5)),
            ]),
            before,
        );

        let inverse = derive_inverse(&record, None).unwrap();
        assert_eq!(
            inverse,
            ChangeSpec::patch_fields([
                ("title".to_string(), FieldValue::Text("Agent".into())),
                ("proficiency".to_string(), FieldValue::Absent),
            ])
        );
    }

    #[test]
    fn backlinked_record_is_rejected() {
        let mut record = membership_record(ChangeSpec::add_members(vec![]), vec![]);
        record.rolled_back_by = Some(OperationId::new());
        let err = validate_rollback(&record, i64::MAX, false, 2_000).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRolledBack(_)));
    }

    #[test]
    fn stale_record_needs_override() {
        let record = membership_record(ChangeSpec::add_members(vec![]), vec![]);
        let now = record.before.captured_at + 10_000;
        let err = validate_rollback(&record, 5_000, false, now).unwrap_err();
        assert!(matches!(err, EngineError::StaleRecord { .. }));
        validate_rollback(&record, 5_000, true, now).unwrap();
        validate_rollback(&record, 20_000, false, now).unwrap();
    }
}
