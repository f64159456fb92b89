//! An embeddable key/value cache bounded by total value size.
//!
//! Entries are evicted least-recently-used first when a store would exceed
//! the byte capacity, and expire after a per-entry or default TTL. Expired
//! entries are dropped lazily on read and, optionally, by a background reaper.
//!
//! ```
//! use std::time::Duration;
//! use lru_ttl_cache::{Config, LruCache};
//!
//! let cache = LruCache::new(Config::new().with_max_size(1024)).unwrap();
//! cache.store("greeting", "hello", Some(Duration::from_secs(60))).unwrap();
//! assert_eq!(cache.get("greeting").unwrap(), "hello");
//! cache.close();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, LruCache};
pub use config::Config;
pub use error::{CacheError, Result};
