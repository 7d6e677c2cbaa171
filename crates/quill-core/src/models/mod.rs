//! Data models for Quill

mod fields;
mod folder;
mod item;
mod item_id;
mod item_type;
mod master_key;
mod note;
mod resource;
mod tag;

pub use fields::{format_time, parse_time};
pub use folder::Folder;
pub use item::Item;
pub use item_id::ItemId;
pub use item_type::ItemType;
pub use master_key::MasterKey;
pub use note::Note;
pub use resource::Resource;
pub use tag::Tag;
