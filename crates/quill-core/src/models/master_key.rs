//! Master key model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::unix_ms_now;

use super::fields::{FieldReader, FieldWriter};
use super::ItemId;

/// Key material synced between replicas.
///
/// `content` is the data key already sealed with the user's password by the
/// encryption service; the synchronizer moves it around verbatim and never
/// encrypts it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKey {
    pub id: ItemId,
    pub created_time: i64,
    pub updated_time: i64,
    pub source_application: String,
    pub encryption_method: i64,
    pub checksum: String,
    pub content: String,
}

impl MasterKey {
    #[must_use]
    pub fn new(
        source_application: impl Into<String>,
        encryption_method: i64,
        checksum: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = unix_ms_now();
        Self {
            id: ItemId::new(),
            created_time: now,
            updated_time: now,
            source_application: source_application.into(),
            encryption_method,
            checksum: checksum.into(),
            content: content.into(),
        }
    }

    pub(crate) fn write_fields(&self, fields: &mut FieldWriter) {
        fields.id("id", &self.id);
        fields.time("created_time", self.created_time);
        fields.time("updated_time", self.updated_time);
        fields.text("source_application", &self.source_application);
        fields.int("encryption_method", self.encryption_method);
        fields.text("checksum", &self.checksum);
        fields.text("content", &self.content);
    }

    pub(crate) fn read_fields(fields: &FieldReader) -> Result<Self> {
        Ok(Self {
            id: fields.id("id")?,
            created_time: fields.time("created_time")?,
            updated_time: fields.time("updated_time")?,
            source_application: fields.text("source_application"),
            encryption_method: fields.int("encryption_method")?,
            checksum: fields.text("checksum"),
            content: fields.text("content"),
        })
    }
}
