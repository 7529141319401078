//! Storage implementations for the harvester library.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (always available)
//! - `FileDedupStore` / `FileGeocodeCache` - JSON files (always available)
//! - `SqliteStore` - SQLite file-based storage (requires `sqlite` feature)

pub mod file;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{FileDedupStore, FileGeocodeCache};
pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
