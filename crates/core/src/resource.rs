use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    User,
    Group,
    Queue,
    Skill,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Queue => "queue",
            Self::Skill => "skill",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "queue" => Ok(Self::Queue),
            "skill" => Ok(Self::Skill),
            _ => Err(CoreError::InvalidData(format!("unknown resource type: {s}"))),
        }
    }

    /// Whether this resource holds a member set that membership operations
    /// act on. Groups and queues contain users; a user contains its assigned
    /// skills.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Group | Self::Queue | Self::User)
    }

    /// The member type a container holds, if any.
    pub fn member_type(&self) -> Option<ResourceType> {
        match self {
            Self::Group | Self::Queue => Some(Self::User),
            Self::User => Some(Self::Skill),
            Self::Skill => None,
        }
    }
}

/// Immutable identity of one remote entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub rtype: ResourceType,
    pub id: String,
}

impl ResourceRef {
    pub fn new(rtype: ResourceType, id: impl Into<String>) -> Self {
        Self { rtype, id: id.into() }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ResourceType::User, id)
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Group, id)
    }

    pub fn queue(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Queue, id)
    }

    pub fn skill(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Skill, id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rtype.as_str(), self.id)
    }
}
