//! Backend implementations of the store contract:
//! - `memory`: in-memory storage for tests and transient use
//! - `file`: JSON-file-per-document storage for local durability

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
