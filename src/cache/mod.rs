//! Local persistence: key-value and structured stores plus the versioned
//! object cache built on them.
//!
//! - `KeyValueStore` holds small JSON records under fixed keys (session
//!   tokens, offline queues, sync markers)
//! - `ObjectStore` holds larger payloads with `{timestamp, expires_at, version}`
//! - `CacheLayer` adds expiry/version checks and fetch-through on top

mod layer;
mod storage;
mod traits;

pub use layer::{essential_keys, CacheLayer, CACHE_VERSION};
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, KeyValueStore, ObjectStore, StoredObject};
