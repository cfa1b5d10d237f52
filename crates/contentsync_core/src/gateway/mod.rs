//! Remote content store access.
//!
//! # Responsibility
//! - Define the transport seam used to reach the remote content store.
//! - Map HTTP-level outcomes into the gateway error taxonomy.
//!
//! # Invariants
//! - Gateway calls never retry, cache or emit events; callers own those.
//! - `404` on a read is a valid negative result, not an error.

pub mod memory;
pub mod remote;
pub mod transport;
