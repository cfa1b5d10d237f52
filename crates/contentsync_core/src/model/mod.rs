//! Domain model mirrored from the remote content store.
//!
//! # Responsibility
//! - Define canonical data structures shared by cache, gateway and services.
//! - Keep the wire shape (camelCase JSON) next to the types that carry it.
//!
//! # Invariants
//! - A content object is addressed by its `slug`; its numeric `id` is stable
//!   once assigned by the remote store.

pub mod content;
pub mod version;
