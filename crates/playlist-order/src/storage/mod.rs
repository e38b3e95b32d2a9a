pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use schema::*;
pub use sqlite::SqliteStore;
