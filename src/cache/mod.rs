//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and byte-bounded LRU eviction.

mod entry;
mod ledger;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use ledger::{Keys, Ledger};
pub use stats::CacheStats;
pub use store::LruCache;

pub(crate) use store::CacheState;
