pub mod document;
pub mod file;
pub mod memory;

pub use document::{default_class, CollectionDocument, StoreDocument};
pub use file::FileTagStore;
pub use memory::MemoryTagStore;
