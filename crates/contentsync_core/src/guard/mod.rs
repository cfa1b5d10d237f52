//! Optimistic snapshot guard.
//!
//! # Responsibility
//! - Remember the most recent locally saved object per logical key.
//! - Decide whether a background read may overwrite the cache.
//!
//! # Invariants
//! - At most one snapshot per key.
//! - While a snapshot is held, fetched results for that key are discarded in
//!   favour of the snapshot.

pub mod snapshot_guard;
