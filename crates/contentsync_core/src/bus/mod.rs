//! Cross-surface event broadcast.
//!
//! # Responsibility
//! - Deliver typed notifications (invalidation, refresh, history reset,
//!   special update) to every subscriber of a kind.
//! - Provide the subscriber-side throttle and in-flight guard that stop
//!   refresh-triggers-refresh loops.
//!
//! # Invariants
//! - Within one `(kind, key)` pair handlers observe events in publish order,
//!   including events published from inside a handler.
//! - An event without a key applies to every key.

pub mod broadcast;
pub mod event;
pub mod throttle;
