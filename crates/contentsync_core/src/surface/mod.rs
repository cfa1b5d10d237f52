//! Editing surface orchestration.
//!
//! A surface is one UI view bound to one logical key at a time. It owns
//! edit-mode state and reacts to broadcasts from other surfaces; every
//! consistency rule lives in the service layer.

pub mod capability;
pub mod editor;
