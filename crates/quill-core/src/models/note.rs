//! Note model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::unix_ms_now;

use super::fields::{FieldReader, FieldWriter};
use super::ItemId;

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: ItemId,
    /// Folder containing this note
    pub parent_id: Option<ItemId>,
    /// Single-line title
    pub title: String,
    /// Plain text body
    pub body: String,
    /// Creation timestamp (Unix ms)
    pub created_time: i64,
    /// Last update timestamp (Unix ms)
    pub updated_time: i64,
    /// Copy preserving local edits that lost a sync conflict
    pub is_conflict: bool,
    /// Encrypted serialization while the note has not been decrypted yet
    pub encryption_cipher_text: String,
    /// Whether `title`/`body` are still locked inside `encryption_cipher_text`
    pub encryption_applied: bool,
}

impl Note {
    /// Create a new note in the given folder
    #[must_use]
    pub fn new(
        parent_id: Option<ItemId>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = unix_ms_now();
        Self {
            id: ItemId::new(),
            parent_id,
            title: single_line(title.into()),
            body: body.into(),
            created_time: now,
            updated_time: now,
            is_conflict: false,
            encryption_cipher_text: String::new(),
            encryption_applied: false,
        }
    }

    /// Whether a conflict with `remote` would lose user-visible content.
    ///
    /// Only title and body count; when they match there is nothing to keep.
    #[must_use]
    pub fn must_handle_conflict(&self, remote: &Self) -> bool {
        self.title != remote.title || self.body != remote.body
    }

    /// Duplicate this note as a conflict copy with a fresh id.
    ///
    /// Timestamps are kept so the copy shows when the user made the edit.
    #[must_use]
    pub fn conflict_copy(&self) -> Self {
        Self {
            id: ItemId::new(),
            is_conflict: true,
            ..self.clone()
        }
    }

    pub(crate) fn write_fields(&self, fields: &mut FieldWriter) {
        fields.id("id", &self.id);
        fields.opt_id("parent_id", self.parent_id.as_ref());
        fields.time("created_time", self.created_time);
        fields.time("updated_time", self.updated_time);
        fields.flag("is_conflict", self.is_conflict);
        fields.text("encryption_cipher_text", &self.encryption_cipher_text);
        fields.flag("encryption_applied", self.encryption_applied);
    }

    pub(crate) fn read_fields(title: String, body: String, fields: &FieldReader) -> Result<Self> {
        Ok(Self {
            id: fields.id("id")?,
            parent_id: fields.opt_id("parent_id")?,
            title,
            body,
            created_time: fields.time("created_time")?,
            updated_time: fields.time("updated_time")?,
            is_conflict: fields.flag("is_conflict"),
            encryption_cipher_text: fields.text("encryption_cipher_text"),
            encryption_applied: fields.flag("encryption_applied"),
        })
    }

    pub(crate) fn encrypted_shell(&self, cipher_text: String) -> Self {
        Self {
            id: self.id,
            parent_id: self.parent_id,
            title: String::new(),
            body: String::new(),
            created_time: self.created_time,
            updated_time: self.updated_time,
            is_conflict: false,
            encryption_cipher_text: cipher_text,
            encryption_applied: true,
        }
    }
}

/// Titles are a single line in the text format.
pub(crate) fn single_line(value: String) -> String {
    if value.contains(['\n', '\r']) {
        value.replace("\r\n", " ").replace(['\n', '\r'], " ")
    } else {
        value
    }
}
