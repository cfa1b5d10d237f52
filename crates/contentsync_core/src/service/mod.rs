//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate resolver, gateway, cache, guard and bus into the read,
//!   save and version-history use cases.
//! - Keep UI/FFI layers decoupled from transport details.

pub mod content_service;
pub mod version_history;
