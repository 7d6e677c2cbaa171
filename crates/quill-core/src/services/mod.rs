//! Async service wrappers shared by clients and the synchronizer.

mod database;

pub use database::DatabaseService;
