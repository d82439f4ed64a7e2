//! Versioned persistent cache over durable key/value storage.

mod persistent;
mod storage;

pub use persistent::{CacheKey, CachePolicy, PersistentCache};
pub use storage::{FileStorage, MemoryStorage, Storage};
