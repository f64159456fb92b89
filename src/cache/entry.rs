//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

use bytes::Bytes;

// == Cache Entry ==
/// A single cached value and its expiry deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the entry is indexed under
    pub key: String,
    /// The stored bytes
    pub value: Bytes,
    /// Absolute expiry deadline, None = never expires
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry that expires `ttl` after `now`, or never when `ttl` is
    /// None or too large to express as a deadline.
    pub fn new(key: String, value: Bytes, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            key,
            value,
            // A deadline past what Instant can represent never arrives.
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    // == Size ==
    /// Number of bytes this entry charges against capacity.
    pub fn size(&self) -> usize {
        self.value.len()
    }

    // == Is Expired ==
    /// Checks whether the entry is past its deadline at `now`.
    ///
    /// An entry is live up to and including its deadline instant and expired
    /// strictly after it.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => deadline < now,
            None => false,
        }
    }
}
