//! Item type tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Variant tag of a synchronizable item.
///
/// The numeric codes are part of the remote text format (`type_` property)
/// and the `sync_items`/`deleted_items` tables, so they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Note,
    Folder,
    Resource,
    Tag,
    MasterKey,
}

impl ItemType {
    /// All item types, in the order local changes are pushed.
    pub const SYNC_ORDER: [Self; 5] = [
        Self::Folder,
        Self::Note,
        Self::Resource,
        Self::Tag,
        Self::MasterKey,
    ];

    pub const fn code(self) -> i64 {
        match self {
            Self::Note => 1,
            Self::Folder => 2,
            Self::Resource => 4,
            Self::Tag => 5,
            Self::MasterKey => 9,
        }
    }

    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Note),
            2 => Some(Self::Folder),
            4 => Some(Self::Resource),
            5 => Some(Self::Tag),
            9 => Some(Self::MasterKey),
            _ => None,
        }
    }

    /// Local table holding items of this type.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Note => "notes",
            Self::Folder => "folders",
            Self::Resource => "resources",
            Self::Tag => "tags",
            Self::MasterKey => "master_keys",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Note => "Note",
            Self::Folder => "Folder",
            Self::Resource => "Resource",
            Self::Tag => "Tag",
            Self::MasterKey => "MasterKey",
        }
    }

    /// Master keys must stay readable without a key, so they are never encrypted.
    pub const fn supports_encryption(self) -> bool {
        !matches!(self, Self::MasterKey)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
