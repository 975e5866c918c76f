//! Operation executor: applies a change item by item, in deterministic order,
//! and never lets one bad row kill the batch. Per-item failures are recorded
//! as data in the returned `ItemResult`s, not surfaced as `Err`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use opsdeck_client::{RemoteDirectory, RemoteError};
use opsdeck_core::{ChangeSpec, FieldValue, ItemKey, ItemResult, ResourceRef};

/// Cooperative cancellation checked between items. A call already issued to
/// the remote runs to completion; items never dispatched are recorded as
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Apply `change` to `target`. Member lists execute in input order, field
/// patches in sorted field-name order. The caller holds the target lock and
/// has already persisted the pending record.
pub fn execute(
    remote: &dyn RemoteDirectory,
    target: &ResourceRef,
    change: &ChangeSpec,
    cancel: &CancelFlag,
) -> Vec<ItemResult> {
    match change {
        ChangeSpec::AddMembers(members) => {
            run_membership(remote, target, members, true, cancel)
        }
        ChangeSpec::RemoveMembers(members) => {
            run_membership(remote, target, members, false, cancel)
        }
        ChangeSpec::PatchFields(fields) => run_patch(remote, target, fields, cancel),
    }
}

fn run_membership(
    remote: &dyn RemoteDirectory,
    target: &ResourceRef,
    members: &[ResourceRef],
    adding: bool,
    cancel: &CancelFlag,
) -> Vec<ItemResult> {
    // Live membership is read once up front and maintained as items apply.
    // The target lock keeps our own operations from moving it underneath;
    // an external writer racing the batch is not excluded and surfaces as a
    // per-item failure from the remote rather than a skip here.
    let mut current = match remote.list_members(target) {
        Ok(members) => members,
        Err(e) => {
            return members
                .iter()
                .map(|m| {
                    ItemResult::failed(
                        ItemKey::Member(m.clone()),
                        format!("could not read current members: {e}"),
                    )
                })
                .collect();
        }
    };

    let mut results = Vec::with_capacity(members.len());
    for member in members {
        let key = ItemKey::Member(member.clone());
        if cancel.is_cancelled() {
            results.push(ItemResult::skipped(key, Some("cancelled before dispatch".into())));
            continue;
        }
        let present = current.contains(member);
        if adding && present {
            results.push(ItemResult::skipped(key, Some("already a member".into())));
            continue;
        }
        if !adding && !present {
            results.push(ItemResult::skipped(key, Some("not a member".into())));
            continue;
        }
        let call = if adding {
            remote.add_members(target, std::slice::from_ref(member))
        } else {
            remote.remove_members(target, std::slice::from_ref(member))
        };
        match call {
            Ok(()) => {
                if adding {
                    current.push(member.clone());
                } else {
                    current.retain(|m| m != member);
                }
                results.push(ItemResult::applied(key));
            }
            Err(RemoteError::Unsupported(msg)) => results.push(ItemResult::unsupported(key, msg)),
            Err(e) => results.push(ItemResult::failed(key, e.to_string())),
        }
    }
    results
}

fn run_patch(
    remote: &dyn RemoteDirectory,
    target: &ResourceRef,
    fields: &BTreeMap<String, FieldValue>,
    cancel: &CancelFlag,
) -> Vec<ItemResult> {
    let live = remote.get(target);
    let mut results = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        let key = ItemKey::Field(name.clone());
        if cancel.is_cancelled() {
            results.push(ItemResult::skipped(key, Some("cancelled before dispatch".into())));
            continue;
        }
        let already_set = match &live {
            Ok(entity) => entity.field(name) == *value,
            Err(_) => false,
        };
        if already_set {
            results.push(ItemResult::skipped(key, Some("already set".into())));
            continue;
        }
        let call = if value.is_absent() {
            remote.clear_field(target, name)
        } else {
            remote.patch_field(target, name, value)
        };
        match call {
            Ok(()) => results.push(ItemResult::applied(key)),
            Err(RemoteError::Unsupported(msg)) => results.push(ItemResult::unsupported(key, msg)),
            Err(e) => results.push(ItemResult::failed(key, e.to_string())),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_client::MockDirectory;
    use opsdeck_core::ItemOutcome;

    fn seeded() -> MockDirectory {
        let dir = MockDirectory::new();
        dir.insert(ResourceRef::group("g1"), "Support", []);
        for i in 1..=10 {
            dir.insert(ResourceRef::user(format!("u{i}")), "user", []);
        }
        dir.set_members(ResourceRef::group("g1"), vec![ResourceRef::user("u1")]);
        dir
    }

    #[test]
    fn one_failed_item_does_not_stop_the_batch() {
        let dir = seeded();
        dir.fail_member(ResourceRef::user("u3"));
        let members: Vec<_> = (1..=10).map(|i| ResourceRef::user(format!("u{i}"))).collect();
        let change = ChangeSpec::add_members(members);

        let results = execute(&dir, &ResourceRef::group("g1"), &change, &CancelFlag::new());
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].outcome, ItemOutcome::Skipped);
        assert_eq!(results[2].outcome, ItemOutcome::Failed);
        let applied = results.iter().filter(|r| r.outcome == ItemOutcome::Applied).count();
        assert_eq!(applied, 8);
        assert_eq!(dir.members(&ResourceRef::group("g1")).len(), 9);
    }

    #[test]
    fn remove_of_non_member_is_skipped() {
        let dir = seeded();
        let change = ChangeSpec::remove_members(vec![
            ResourceRef::user("u1"),
            ResourceRef::user("u2"),
        ]);
        let results = execute(&dir, &ResourceRef::group("g1"), &change, &CancelFlag::new());
        assert_eq!(results[0].outcome, ItemOutcome::Applied);
        assert_eq!(results[1].outcome, ItemOutcome::Skipped);
        assert!(dir.members(&ResourceRef::group("g1")).is_empty());
    }

    #[test]
    fn clear_of_unclearable_field_is_unsupported() {
        let dir = seeded();
        dir.deny_clear("proficiency");
        let user = ResourceRef::user("u1");
        dir.insert(user.clone(), "Alice", [("proficiency", FieldValue::Integer(3))]);
        let change = ChangeSpec::patch_fields([("proficiency".to_string(), FieldValue::Absent)]);

        let results = execute(&dir, &user, &change, &CancelFlag::new());
        assert_eq!(results[0].outcome, ItemOutcome::Unsupported);
        assert_eq!(dir.field(&user, "proficiency"), FieldValue::Integer(3));
    }

    #[test]
    fn patch_matching_live_value_is_skipped() {
        let dir = seeded();
        let user = ResourceRef::user("u1");
        dir.insert(user.clone(), "Alice", [("title", FieldValue::Text("Agent".into()))]);
        let change = ChangeSpec::patch_fields([("title".to_string(), FieldValue::Text("Agent".into()))]);

        let results = execute(&dir, &user, &change, &CancelFlag::new());
        assert_eq!(results[0].outcome, ItemOutcome::Skipped);
        assert_eq!(dir.mutation_calls(), 0);
    }

    #[test]
    fn cancelled_items_are_skipped_not_dispatched() {
        let dir = seeded();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let change = ChangeSpec::add_members(vec![ResourceRef::user("u2")]);

        let results = execute(&dir, &ResourceRef::group("g1"), &change, &cancel);
        assert_eq!(results[0].outcome, ItemOutcome::Skipped);
        assert_eq!(results[0].error.as_deref(), Some("cancelled before dispatch"));
        assert_eq!(dir.mutation_calls(), 0);
    }
}
