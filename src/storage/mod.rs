// Local readings cache backed by SQLite.

pub mod sqlite;

pub use sqlite::SqliteStorage;
