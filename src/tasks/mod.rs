//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside a cache.
//!
//! # Tasks
//! - TTL Reaper: Removes expired cache entries at a configured interval

mod reaper;

pub use reaper::{Reaper, MAX_INTERVAL};
