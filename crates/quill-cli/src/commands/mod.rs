pub mod add;
pub mod common;
pub mod completions;
pub mod delete;
pub mod folder;
pub mod list;
pub mod status;
pub mod sync;
