use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::resource::ResourceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    AddMembers,
    RemoveMembers,
    PatchFields,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddMembers => "add_members",
            Self::RemoveMembers => "remove_members",
            Self::PatchFields => "patch_fields",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "add_members" => Ok(Self::AddMembers),
            "remove_members" => Ok(Self::RemoveMembers),
            "patch_fields" => Ok(Self::PatchFields),
            _ => Err(CoreError::InvalidData(format!("unknown operation kind: {s}"))),
        }
    }
}

/// The intended mutation, independent of its outcome.
///
/// Member lists keep the operator's input order (per-item results are
/// reported in that order) but are de-duplicated on construction; patch
/// fields iterate in sorted key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeSpec {
    AddMembers(Vec<ResourceRef>),
    RemoveMembers(Vec<ResourceRef>),
    PatchFields(BTreeMap<String, FieldValue>),
}

fn dedup_members(members: Vec<ResourceRef>) -> Vec<ResourceRef> {
    let mut seen = BTreeSet::new();
    members.into_iter().filter(|m| seen.insert(m.clone())).collect()
}

impl ChangeSpec {
    pub fn add_members(members: Vec<ResourceRef>) -> Self {
        Self::AddMembers(dedup_members(members))
    }

    pub fn remove_members(members: Vec<ResourceRef>) -> Self {
        Self::RemoveMembers(dedup_members(members))
    }

    pub fn patch_fields(fields: impl IntoIterator<Item = (String, FieldValue)>) -> Self {
        Self::PatchFields(fields.into_iter().collect())
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::AddMembers(_) => OperationKind::AddMembers,
            Self::RemoveMembers(_) => OperationKind::RemoveMembers,
            Self::PatchFields(_) => OperationKind::PatchFields,
        }
    }

    pub fn is_membership(&self) -> bool {
        !matches!(self, Self::PatchFields(_))
    }

    /// Number of individually-executed items in this change.
    pub fn item_count(&self) -> usize {
        match self {
            Self::AddMembers(m) | Self::RemoveMembers(m) => m.len(),
            Self::PatchFields(f) => f.len(),
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
