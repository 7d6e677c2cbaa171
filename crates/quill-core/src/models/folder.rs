//! Folder model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::unix_ms_now;

use super::fields::{FieldReader, FieldWriter};
use super::note::single_line;
use super::ItemId;

/// A folder grouping notes and other folders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: ItemId,
    /// Enclosing folder, `None` at the top level
    pub parent_id: Option<ItemId>,
    pub title: String,
    pub created_time: i64,
    pub updated_time: i64,
    pub encryption_cipher_text: String,
    pub encryption_applied: bool,
}

impl Folder {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = unix_ms_now();
        Self {
            id: ItemId::new(),
            parent_id: None,
            title: single_line(title.into()),
            created_time: now,
            updated_time: now,
            encryption_cipher_text: String::new(),
            encryption_applied: false,
        }
    }

    pub(crate) fn write_fields(&self, fields: &mut FieldWriter) {
        fields.id("id", &self.id);
        fields.opt_id("parent_id", self.parent_id.as_ref());
        fields.time("created_time", self.created_time);
        fields.time("updated_time", self.updated_time);
        fields.text("encryption_cipher_text", &self.encryption_cipher_text);
        fields.flag("encryption_applied", self.encryption_applied);
    }

    pub(crate) fn read_fields(title: String, fields: &FieldReader) -> Result<Self> {
        Ok(Self {
            id: fields.id("id")?,
            parent_id: fields.opt_id("parent_id")?,
            title,
            created_time: fields.time("created_time")?,
            updated_time: fields.time("updated_time")?,
            encryption_cipher_text: fields.text("encryption_cipher_text"),
            encryption_applied: fields.flag("encryption_applied"),
        })
    }

    pub(crate) fn encrypted_shell(&self, cipher_text: String) -> Self {
        Self {
            title: String::new(),
            encryption_cipher_text: cipher_text,
            encryption_applied: true,
            ..self.clone()
        }
    }
}
