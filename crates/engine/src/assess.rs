//! Impact assessment: a dry run that classifies every item of a change
//! against live remote state. Performs reads only and takes no target lock,
//! so it can run while another operation holds the target.

use opsdeck_client::RemoteDirectory;
use opsdeck_core::{ChangeSpec, FieldValue, ItemKey, ResourceRef};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemImpact {
    /// Applying this item would change nothing.
    NoOp,
    /// The referenced member does not exist remotely.
    NotFound,
    WillAdd,
    WillRemove,
    WillChange { from: FieldValue, to: FieldValue },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessedItem {
    pub item: ItemKey,
    pub impact: ItemImpact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentReport {
    pub target: ResourceRef,
    pub items: Vec<AssessedItem>,
}

impl AssessmentReport {
    /// Items that would actually mutate remote state.
    pub fn effective_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| {
                matches!(
                    i.impact,
                    ItemImpact::WillAdd | ItemImpact::WillRemove | ItemImpact::WillChange { .. }
                )
            })
            .count()
    }

    pub fn noop_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.impact == ItemImpact::NoOp)
            .count()
    }

    pub fn missing_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.impact == ItemImpact::NotFound)
            .count()
    }

    pub fn is_noop(&self) -> bool {
        self.effective_count() == 0
    }
}

/// Classify each item of `change` against current remote state. A failure to
/// read the target (or resolve a member for reasons other than absence)
/// rejects the whole assessment.
pub fn assess(
    remote: &dyn RemoteDirectory,
    target: &ResourceRef,
    change: &ChangeSpec,
) -> Result<AssessmentReport, EngineError> {
    let items = match change {
        ChangeSpec::AddMembers(members) => {
            let current = remote
                .list_members(target)
                .map_err(|e| EngineError::remote_fetch(target, e))?;
            let mut items = Vec::with_capacity(members.len());
            for member in members {
                let impact = if current.contains(member) {
                    ItemImpact::NoOp
                } else {
                    match remote.get(member) {
                        Ok(_) => ItemImpact::WillAdd,
                        Err(e) if e.is_not_found() => ItemImpact::NotFound,
                        Err(e) => return Err(EngineError::remote_fetch(member, e)),
                    }
                };
                items.push(AssessedItem {
                    item: ItemKey::Member(member.clone()),
                    impact,
                });
            }
            items
        }
        ChangeSpec::RemoveMembers(members) => {
            let current = remote
                .list_members(target)
                .map_err(|e| EngineError::remote_fetch(target, e))?;
            members
                .iter()
                .map(|member| AssessedItem {
                    item: ItemKey::Member(member.clone()),
                    impact: if current.contains(member) {
                        ItemImpact::WillRemove
                    } else {
                        ItemImpact::NoOp
                    },
                })
                .collect()
        }
        ChangeSpec::PatchFields(fields) => {
            let entity = remote
                .get(target)
                .map_err(|e| EngineError::remote_fetch(target, e))?;
            fields
                .iter()
                .map(|(name, desired)| {
                    let from = entity.field(name);
                    AssessedItem {
                        item: ItemKey::Field(name.clone()),
                        impact: if from == *desired {
                            ItemImpact::NoOp
                        } else {
                            ItemImpact::WillChange {
                                from,
                                to: desired.clone(),
                            }
                        },
                    }
                })
                .collect()
        }
    };
    Ok(AssessmentReport {
        target: target.clone(),
        items,
    })
}
