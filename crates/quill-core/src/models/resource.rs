//! Resource (attachment) model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::unix_ms_now;

use super::fields::{FieldReader, FieldWriter};
use super::note::single_line;
use super::ItemId;

/// Attachment metadata. The binary content lives in a separate blob that is
/// stored next to the row locally and under the resource directory remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ItemId,
    pub title: String,
    /// Content MIME type
    pub mime: String,
    /// Original file name
    pub filename: String,
    pub file_extension: String,
    /// Blob size in bytes
    pub size: i64,
    pub created_time: i64,
    pub updated_time: i64,
    pub encryption_cipher_text: String,
    pub encryption_applied: bool,
}

impl Resource {
    /// Create resource metadata for a blob of `size` bytes.
    pub fn new(filename: impl Into<String>, mime: impl Into<String>, size: i64) -> Result<Self> {
        let filename = single_line(filename.into()).trim().to_string();
        let mime = mime.into().trim().to_string();

        if filename.is_empty() {
            return Err(Error::InvalidInput(
                "Resource filename cannot be empty".to_string(),
            ));
        }
        if mime.is_empty() {
            return Err(Error::InvalidInput(
                "Resource mime type cannot be empty".to_string(),
            ));
        }
        if size < 0 {
            return Err(Error::InvalidInput(
                "Resource size cannot be negative".to_string(),
            ));
        }

        let file_extension = filename
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase())
            .unwrap_or_default();
        let now = unix_ms_now();

        Ok(Self {
            id: ItemId::new(),
            title: filename.clone(),
            mime,
            filename,
            file_extension,
            size,
            created_time: now,
            updated_time: now,
            encryption_cipher_text: String::new(),
            encryption_applied: false,
        })
    }

    pub(crate) fn write_fields(&self, fields: &mut FieldWriter) {
        fields.id("id", &self.id);
        fields.text("mime", &self.mime);
        fields.text("filename", &self.filename);
        fields.text("file_extension", &self.file_extension);
        fields.int("size", self.size);
        fields.time("created_time", self.created_time);
        fields.time("updated_time", self.updated_time);
        fields.text("encryption_cipher_text", &self.encryption_cipher_text);
        fields.flag("encryption_applied", self.encryption_applied);
    }

    pub(crate) fn read_fields(title: String, fields: &FieldReader) -> Result<Self> {
        Ok(Self {
            id: fields.id("id")?,
            title,
            mime: fields.text("mime"),
            filename: fields.text("filename"),
            file_extension: fields.text("file_extension"),
            size: fields.int("size")?,
            created_time: fields.time("created_time")?,
            updated_time: fields.time("updated_time")?,
            encryption_cipher_text: fields.text("encryption_cipher_text"),
            encryption_applied: fields.flag("encryption_applied"),
        })
    }

    pub(crate) fn encrypted_shell(&self, cipher_text: String) -> Self {
        Self {
            title: String::new(),
            mime: String::new(),
            filename: String::new(),
            file_extension: String::new(),
            size: 0,
            encryption_cipher_text: cipher_text,
            encryption_applied: true,
            ..self.clone()
        }
    }
}
