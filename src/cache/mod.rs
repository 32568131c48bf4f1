//! Layered collection caching.
//!
//! Three pieces, stacked from the bottom up:
//! - Storage backends: opaque key-value stores (in-process or SQLite)
//! - Persistent sessions: one serialized blob mapping collection keys to
//!   record lists, with an in-memory shadow
//! - Collection caches and their container: what resources actually hold

mod collection;
mod container;
mod session;
mod storage;

pub use collection::CollectionCache;
pub use container::{CacheContainer, CacheHandle};
pub use session::{PersistentSession, SessionOptions, DEFAULT_STORAGE_KEY};
pub use storage::{MemoryStorage, SqliteStorage, StorageBackend, StorageScope};
