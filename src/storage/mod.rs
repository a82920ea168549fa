//! 持久化后端

pub mod sqlite;

pub use sqlite::SqliteStore;
