//! Synchronizable items and their text serialization.
//!
//! The remote form of an item is plain text:
//!
//! ```text
//! Title
//!
//! Body, possibly spanning
//! several lines
//!
//! id: 0190b8a43f5e7c1a9d2b1a2b3c4d5e6f
//! parent_id: 0190b8a43f5e7c1a9d2b1a2b3c4d5e70
//! created_time: 2024-07-14T02:40:00.123Z
//! updated_time: 2024-07-14T02:40:00.123Z
//! type_: 1
//! ```
//!
//! The title and body header is omitted when both are empty. Properties are
//! read back from the end of the text up to the first blank line, so the body
//! may contain blank lines of its own.

use serde::{Deserialize, Serialize};

use crate::encryption::EncryptionService;
use crate::error::{Error, Result};
use crate::file_api::system_path;
use crate::util::unix_ms_now;

use super::fields::{FieldReader, FieldWriter};
use super::{Folder, ItemId, ItemType, MasterKey, Note, Resource, Tag};

/// Any item that takes part in synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Note(Note),
    Folder(Folder),
    Resource(Resource),
    Tag(Tag),
    MasterKey(MasterKey),
}

impl Item {
    pub const fn item_type(&self) -> ItemType {
        match self {
            Self::Note(_) => ItemType::Note,
            Self::Folder(_) => ItemType::Folder,
            Self::Resource(_) => ItemType::Resource,
            Self::Tag(_) => ItemType::Tag,
            Self::MasterKey(_) => ItemType::MasterKey,
        }
    }

    pub const fn id(&self) -> ItemId {
        match self {
            Self::Note(note) => note.id,
            Self::Folder(folder) => folder.id,
            Self::Resource(resource) => resource.id,
            Self::Tag(tag) => tag.id,
            Self::MasterKey(key) => key.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Note(note) => &note.title,
            Self::Folder(folder) => &folder.title,
            Self::Resource(resource) => &resource.title,
            Self::Tag(tag) => &tag.title,
            Self::MasterKey(_) => "",
        }
    }

    pub const fn parent_id(&self) -> Option<ItemId> {
        match self {
            Self::Note(note) => note.parent_id,
            Self::Folder(folder) => folder.parent_id,
            _ => None,
        }
    }

    pub const fn created_time(&self) -> i64 {
        match self {
            Self::Note(note) => note.created_time,
            Self::Folder(folder) => folder.created_time,
            Self::Resource(resource) => resource.created_time,
            Self::Tag(tag) => tag.created_time,
            Self::MasterKey(key) => key.created_time,
        }
    }

    pub const fn updated_time(&self) -> i64 {
        match self {
            Self::Note(note) => note.updated_time,
            Self::Folder(folder) => folder.updated_time,
            Self::Resource(resource) => resource.updated_time,
            Self::Tag(tag) => tag.updated_time,
            Self::MasterKey(key) => key.updated_time,
        }
    }

    pub fn set_updated_time(&mut self, time: i64) {
        match self {
            Self::Note(note) => note.updated_time = time,
            Self::Folder(folder) => folder.updated_time = time,
            Self::Resource(resource) => resource.updated_time = time,
            Self::Tag(tag) => tag.updated_time = time,
            Self::MasterKey(key) => key.updated_time = time,
        }
    }

    /// Record a local edit. The item becomes dirty for every sync target.
    pub fn touch(&mut self) {
        self.set_updated_time(unix_ms_now());
    }

    /// Whether the content is still locked inside `encryption_cipher_text`.
    pub const fn encryption_applied(&self) -> bool {
        match self {
            Self::Note(note) => note.encryption_applied,
            Self::Folder(folder) => folder.encryption_applied,
            Self::Resource(resource) => resource.encryption_applied,
            Self::Tag(tag) => tag.encryption_applied,
            Self::MasterKey(_) => false,
        }
    }

    fn encryption_cipher_text(&self) -> &str {
        match self {
            Self::Note(note) => &note.encryption_cipher_text,
            Self::Folder(folder) => &folder.encryption_cipher_text,
            Self::Resource(resource) => &resource.encryption_cipher_text,
            Self::Tag(tag) => &tag.encryption_cipher_text,
            Self::MasterKey(_) => "",
        }
    }

    /// Remote metadata path of this item.
    pub fn system_path(&self) -> String {
        system_path(&self.id())
    }

    /// Render the item in the remote text format, without encryption.
    pub fn serialize(&self) -> String {
        let mut fields = FieldWriter::default();
        let (title, body) = match self {
            Self::Note(note) => {
                note.write_fields(&mut fields);
                (note.title.as_str(), note.body.as_str())
            }
            Self::Folder(folder) => {
                folder.write_fields(&mut fields);
                (folder.title.as_str(), "")
            }
            Self::Resource(resource) => {
                resource.write_fields(&mut fields);
                (resource.title.as_str(), "")
            }
            Self::Tag(tag) => {
                tag.write_fields(&mut fields);
                (tag.title.as_str(), "")
            }
            Self::MasterKey(key) => {
                key.write_fields(&mut fields);
                ("", "")
            }
        };
        fields.int("type_", self.item_type().code());

        let mut lines = Vec::new();
        if !title.is_empty() || !body.is_empty() {
            lines.push(title.to_string());
            lines.push(String::new());
            if !body.is_empty() {
                lines.push(body.to_string());
                lines.push(String::new());
            }
        }
        lines.extend(fields.into_lines());
        lines.join("\n")
    }

    /// Parse an item from the remote text format.
    pub fn unserialize(content: &str) -> Result<Self> {
        let lines: Vec<&str> = content.trim_end_matches(['\n', '\r']).split('\n').collect();
        let mut fields = FieldReader::default();
        let mut header_end = 0;

        for (index, line) in lines.iter().enumerate().rev() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                header_end = index;
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Unserialize(format!("invalid property line: {line}")))?;
            let value = value.strip_prefix(' ').unwrap_or(value);
            fields.insert(key.trim().to_string(), value.to_string());
        }

        let header = &lines[..header_end];
        let title = header.first().map(ToString::to_string).unwrap_or_default();
        let body = if header.len() > 2 {
            header[2..].join("\n")
        } else {
            String::new()
        };

        let code = fields.int("type_")?;
        let item_type = ItemType::from_code(code)
            .ok_or_else(|| Error::Unserialize(format!("unknown item type: {code}")))?;

        Ok(match item_type {
            ItemType::Note => Self::Note(Note::read_fields(title, body, &fields)?),
            ItemType::Folder => Self::Folder(Folder::read_fields(title, &fields)?),
            ItemType::Resource => Self::Resource(Resource::read_fields(title, &fields)?),
            ItemType::Tag => Self::Tag(Tag::read_fields(title, &fields)?),
            ItemType::MasterKey => Self::MasterKey(MasterKey::read_fields(&fields)?),
        })
    }

    /// Render the item for upload.
    ///
    /// With an enabled encryption service the remote copy only exposes the
    /// id, parent, timestamps and type; everything else travels inside
    /// `encryption_cipher_text`. Items that were pulled encrypted and never
    /// decrypted are forwarded unchanged.
    pub fn serialize_for_sync(&self, encryption: Option<&dyn EncryptionService>) -> Result<String> {
        let Some(service) = encryption.filter(|service| service.is_enabled()) else {
            return Ok(self.serialize());
        };
        if !self.item_type().supports_encryption() || self.encryption_applied() {
            return Ok(self.serialize());
        }

        let cipher_text = service.encrypt_string(&self.serialize())?;
        let shell = match self {
            Self::Note(note) => Self::Note(note.encrypted_shell(cipher_text)),
            Self::Folder(folder) => Self::Folder(folder.encrypted_shell(cipher_text)),
            Self::Resource(resource) => Self::Resource(resource.encrypted_shell(cipher_text)),
            Self::Tag(tag) => Self::Tag(tag.encrypted_shell(cipher_text)),
            Self::MasterKey(_) => return Ok(self.serialize()),
        };
        Ok(shell.serialize())
    }

    /// Recover the plain item from an encrypted one.
    pub fn decrypted(&self, service: &dyn EncryptionService) -> Result<Self> {
        if !self.encryption_applied() {
            return Ok(self.clone());
        }
        let plain = service.decrypt_string(self.encryption_cipher_text())?;
        let item = Self::unserialize(&plain)?;
        if item.id() != self.id() || item.item_type() != self.item_type() {
            return Err(Error::Encryption(format!(
                "decrypted content does not belong to {} {}",
                self.item_type(),
                self.id()
            )));
        }
        Ok(item)
    }
}

impl From<Note> for Item {
    fn from(note: Note) -> Self {
        Self::Note(note)
    }
}

impl From<Folder> for Item {
    fn from(folder: Folder) -> Self {
        Self::Folder(folder)
    }
}

impl From<Resource> for Item {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<Tag> for Item {
    fn from(tag: Tag) -> Self {
        Self::Tag(tag)
    }
}

impl From<MasterKey> for Item {
    fn from(key: MasterKey) -> Self {
        Self::MasterKey(key)
    }
}
