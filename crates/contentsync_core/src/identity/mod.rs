//! Logical key derivation and candidate ordering.
//!
//! # Responsibility
//! - Turn a `(slug, section)` pair into the canonical cache/lookup key.
//! - Produce alias keys for records stored under historical encodings.
//!
//! # Invariants
//! - Resolution never fails; an empty slug yields no identity.
//! - The canonical key is always the first candidate.

pub mod resolver;
