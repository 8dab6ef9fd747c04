//! Local access-control group types

use serde::{Deserialize, Serialize};

/// Kind of a local group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    #[default]
    Normal,
    /// Groups every new account joins
    Default,
    /// Per-user or system group; never synchronized
    Private,
}

impl GroupKind {
    pub fn as_i64(self) -> i64 {
        match self {
            GroupKind::Normal => 0,
            GroupKind::Default => 1,
            GroupKind::Private => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => GroupKind::Default,
            2 => GroupKind::Private,
            _ => GroupKind::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGroup {
    pub name: String,
    #[serde(default)]
    pub kind: GroupKind,
}

impl LocalGroup {
    pub fn new(name: impl Into<String>, kind: GroupKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_private(&self) -> bool {
        self.kind == GroupKind::Private
    }
}
