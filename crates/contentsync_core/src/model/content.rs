//! Content object domain model.
//!
//! # Responsibility
//! - Define the canonical record mirrored from the remote content store.
//! - Define the editable draft shape submitted by editing surfaces.
//!
//! # Invariants
//! - `slug` uniquely addresses one content object.
//! - `id` is `None` until the remote store assigns it on first creation and
//!   never changes afterwards.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Remote-store assigned numeric identifier.
pub type ContentId = i64;

/// Last-known state of one versioned content object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentObject {
    /// Assigned by the remote store on first save.
    #[serde(default)]
    pub id: Option<ContentId>,
    /// Logical identity, stored in canonical-key form.
    pub slug: String,
    #[serde(default)]
    pub title: String,
    /// Free-form markup or a serialized structured payload.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ContentObject {
    /// Creates an unsaved object (no remote id yet).
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            slug: slug.into(),
            title: title.into(),
            content: content.into(),
            created_at: None,
        }
    }

    /// Builder used by seeding paths where the id already exists remotely.
    pub fn with_id(mut self, id: ContentId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns whether the editable fields equal `draft`.
    pub fn matches_draft(&self, draft: &ContentDraft) -> bool {
        self.title == draft.title && self.content == draft.content
    }
}

/// Editable fields submitted by a surface on save.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentDraft {
    pub title: String,
    pub content: String,
}

impl ContentDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Draft pre-filled from an existing object.
    pub fn from_object(object: &ContentObject) -> Self {
        Self::new(object.title.clone(), object.content.clone())
    }

    /// Client-side checks applied before any network write.
    ///
    /// The remote store stays authoritative; this only rejects drafts that
    /// can never be accepted.
    pub fn validate(&self) -> Result<(), DraftValidationError> {
        if self.title.trim().is_empty() {
            return Err(DraftValidationError::EmptyTitle);
        }
        Ok(())
    }
}

/// Draft rejected before reaching the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftValidationError {
    EmptyTitle,
}

impl Display for DraftValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "content title must not be empty"),
        }
    }
}

impl Error for DraftValidationError {}
