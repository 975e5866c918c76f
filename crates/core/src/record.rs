use serde::{Deserialize, Serialize};

use crate::change::{ChangeSpec, OperationKind};
use crate::error::CoreError;
use crate::ids::OperationId;
use crate::resource::ResourceRef;
use crate::state::ResourceState;
use crate::time::TimestampMs;

/// What a single item of a bulk change addressed: one member for membership
/// operations, one field for patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKey {
    Member(ResourceRef),
    Field(String),
}

impl ItemKey {
    pub fn describe(&self) -> String {
        match self {
            Self::Member(r) => r.to_string(),
            Self::Field(f) => format!("field:{f}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemOutcome {
    Applied,
    Skipped,
    Failed,
    /// The inverse mutation is not expressible against the remote API
    /// (e.g. a field the platform cannot clear).
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item: ItemKey,
    pub outcome: ItemOutcome,
    pub error: Option<String>,
}

impl ItemResult {
    pub fn applied(item: ItemKey) -> Self {
        Self { item, outcome: ItemOutcome::Applied, error: None }
    }

    pub fn skipped(item: ItemKey, note: Option<String>) -> Self {
        Self { item, outcome: ItemOutcome::Skipped, error: note }
    }

    pub fn failed(item: ItemKey, error: String) -> Self {
        Self { item, outcome: ItemOutcome::Failed, error: Some(error) }
    }

    pub fn unsupported(item: ItemKey, error: String) -> Self {
        Self { item, outcome: ItemOutcome::Unsupported, error: Some(error) }
    }
}

/// Batch-level status derived from per-item outcomes. Success is never
/// implied while any item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Succeeded,
    Partial,
    Failed,
}

/// One entry in the rollback record log.
///
/// Created with `before` filled and `items` empty, persisted, then finalized
/// once the executor completes. Immutable afterwards except for the single
/// `rolled_back_by` backlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target: ResourceRef,
    pub before: ResourceState,
    pub change: ChangeSpec,
    pub items: Vec<ItemResult>,
    pub executed_at: TimestampMs,
    pub rolled_back_by: Option<OperationId>,
    /// For a rollback record, the operation it reverses.
    pub reverts: Option<OperationId>,
}

impl OperationRecord {
    pub fn pending(target: ResourceRef, change: ChangeSpec, before: ResourceState) -> Self {
        Self {
            id: OperationId::new(),
            kind: change.kind(),
            target,
            before,
            change,
            items: Vec::new(),
            executed_at: 0,
            rolled_back_by: None,
            reverts: None,
        }
    }

    pub fn status(&self) -> OperationStatus {
        let failed = self
            .items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed | ItemOutcome::Unsupported))
            .count();
        if failed == 0 {
            OperationStatus::Succeeded
        } else if failed == self.items.len() {
            OperationStatus::Failed
        } else {
            OperationStatus::Partial
        }
    }

    pub fn applied_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == ItemOutcome::Applied)
            .count()
    }

    pub fn items_to_msgpack(items: &[ItemResult]) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(items).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn items_from_msgpack(bytes: &[u8]) -> Result<Vec<ItemResult>, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(outcomes: &[ItemOutcome]) -> OperationRecord {
        let target = ResourceRef::group("g1");
        let before = ResourceState::membership_snapshot(target.clone(), 1, vec![]);
        let mut rec = OperationRecord::pending(
            target,
            ChangeSpec::add_members(vec![ResourceRef::user("u1")]),
            before,
        );
        rec.items = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| ItemResult {
                item: ItemKey::Member(ResourceRef::user(format!("u{i}"))),
                outcome: *o,
                error: None,
            })
            .collect();
        rec
    }

    #[test]
    fn status_reflects_item_outcomes() {
        use ItemOutcome::*;
        assert_eq!(record_with(&[Applied, Skipped]).status(), OperationStatus::Succeeded);
        assert_eq!(record_with(&[Applied, Failed]).status(), OperationStatus::Partial);
        assert_eq!(record_with(&[Failed, Unsupported]).status(), OperationStatus::Failed);
    }

    #[test]
    fn item_keys_describe_their_subject() {
        assert_eq!(
            ItemKey::Member(ResourceRef::user("u1")).describe(),
            "user:u1"
        );
        assert_eq!(ItemKey::Field("title".into()).describe(), "field:title");
    }

    #[test]
    fn pending_record_has_no_items() {
        let rec = record_with(&[]);
        assert!(rec.items.is_empty());
        assert!(rec.rolled_back_by.is_none());
        assert_eq!(rec.kind, OperationKind::AddMembers);
    }
}
