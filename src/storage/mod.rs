//! Knowledge-base storage for choreo.
//!
//! Knowledge bases are stored whole, keyed by name, in memory or as JSON
//! files on disk.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileKnowledgeStore;
pub use memory::MemoryKnowledgeStore;
pub use traits::KnowledgeStore;
