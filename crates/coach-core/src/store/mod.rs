//! Storage backends.

mod sqlite;

pub use sqlite::SqliteCoachStore;
