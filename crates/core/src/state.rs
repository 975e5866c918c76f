use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::resource::ResourceRef;
use crate::time::TimestampMs;

/// Snapshot of a target's relevant state taken before a mutation.
///
/// Write-once: a ResourceState is never edited after capture, only
/// superseded by a fresh capture. `membership` is populated for membership
/// operations; `fields` for field patches. Fields that did not exist on the
/// entity are captured as `FieldValue::Absent`, never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub target: ResourceRef,
    pub captured_at: TimestampMs,
    pub fields: BTreeMap<String, FieldValue>,
    pub membership: Option<Vec<ResourceRef>>,
}

impl ResourceState {
    pub fn membership_snapshot(
        target: ResourceRef,
        captured_at: TimestampMs,
        members: Vec<ResourceRef>,
    ) -> Self {
        Self {
            target,
            captured_at,
            fields: BTreeMap::new(),
            membership: Some(members),
        }
    }

    pub fn field_snapshot(
        target: ResourceRef,
        captured_at: TimestampMs,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            target,
            captured_at,
            fields,
            membership: None,
        }
    }

    pub fn has_member(&self, member: &ResourceRef) -> bool {
        self.membership
            .as_ref()
            .is_some_and(|m| m.contains(member))
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_lookup() {
        let state = ResourceState::membership_snapshot(
            ResourceRef::group("g1"),
            1000,
            vec![ResourceRef::user("u1"), ResourceRef::user("u2")],
        );
        assert!(state.has_member(&ResourceRef::user("u1")));
        assert!(!state.has_member(&ResourceRef::user("u3")));
    }

    #[test]
    fn field_snapshot_round_trips() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), FieldValue::Text("Agent".into()));
        fields.insert("proficiency".to_string(), FieldValue::Absent);
        let state = ResourceState::field_snapshot(ResourceRef::user("u1"), 2000, fields);
        let bytes = state.to_msgpack().unwrap();
        assert_eq!(ResourceState::from_msgpack(&bytes).unwrap(), state);
    }
}
