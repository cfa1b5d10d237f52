//! FRB entry crate for the content sync engine.

pub mod api;
