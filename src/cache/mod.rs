//! Persistent cache for booking data
//!
//! This module provides a key-value cache store that serializes values to
//! JSON. The default backend writes one file per key in an XDG-compliant
//! cache directory so entries survive restarts; an in-memory backend is
//! available for throwaway runs.

mod backend;
mod store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use store::{CacheError, CacheStore};

/// Key under which the booking dataset is stored
pub const BOOKING_CACHE_KEY: &str = "booking_data";
