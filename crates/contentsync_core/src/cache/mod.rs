//! Local content cache.
//!
//! # Responsibility
//! - Keep the last-known value per canonical logical key.
//! - Distinguish "not cached" from "confirmed absent".
//!
//! # Invariants
//! - `set` always overwrites; last writer wins.
//! - Invalidation removes entries instead of marking them stale.
//! - Collection updates happen inside one critical section.

pub mod content_cache;
