pub mod db;
pub mod error;
pub mod kv;
pub mod memory;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use kv::KvStore;
pub use memory::MemoryKv;
pub use sqlite::SqliteKv;
