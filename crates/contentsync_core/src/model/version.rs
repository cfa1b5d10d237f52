//! Content version snapshot model.
//!
//! # Invariants
//! - `version_number` is assigned by the remote store, strictly increasing
//!   per parent and never reused.
//! - Right after a successful save the newest version carries the same
//!   `title`/`content` as its parent.

use crate::model::content::ContentId;
use serde::{Deserialize, Serialize};

/// Snapshot of one content object at a point in its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentVersion {
    pub id: i64,
    /// Parent content id.
    pub content_id: ContentId,
    pub version_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Sorts versions newest first.
pub fn sort_newest_first(versions: &mut [ContentVersion]) {
    versions.sort_by(|a, b| {
        b.version_number
            .cmp(&a.version_number)
            .then_with(|| b.id.cmp(&a.id))
    });
}
