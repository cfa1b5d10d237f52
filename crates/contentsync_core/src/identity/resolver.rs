//! Identifier resolver.
//!
//! Older records were written with two inconsistent encodings: the first
//! dash swapped for [`LEGACY_SEPARATOR`], and three-part keys whose trailing
//! name was joined with a space. Lookups try the canonical key first and
//! then those aliases.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

/// Section value that maps to the bare slug.
pub const OVERVIEW_SECTION: &str = "overview";
/// Separator used by legacy records in place of the first dash.
pub const LEGACY_SEPARATOR: char = '_';

static THREE_PART_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^-\s]+)-([^-\s]+)-(\S.*)$").expect("valid three-part key regex")
});

/// Canonical identity of one content object plus its ordered lookup aliases.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalKey {
    canonical: String,
    candidates: Vec<String>,
}

impl LogicalKey {
    /// Resolves a key, returning `None` when the slug carries no identity.
    pub fn new(slug: &str, section: Option<&str>) -> Option<Self> {
        let candidates = resolve(slug, section);
        let canonical = candidates.first()?.clone();
        Some(Self {
            canonical,
            candidates,
        })
    }

    /// Key for an object whose stored slug is already canonical.
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::new(slug, None)
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Lookup candidates, canonical first.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Returns whether `slug` names this key under any known encoding.
    pub fn matches_slug(&self, slug: &str) -> bool {
        self.candidates.iter().any(|candidate| candidate == slug)
    }
}

impl Display for LogicalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Returns the canonical key for `(slug, section)`, or `None` for an empty slug.
pub fn canonical_key(slug: &str, section: Option<&str>) -> Option<String> {
    let slug = slug.trim();
    if slug.is_empty() {
        return None;
    }
    match section.map(str::trim) {
        Some(section) if !section.is_empty() && section != OVERVIEW_SECTION => {
            Some(format!("{slug}-{section}"))
        }
        _ => Some(slug.to_string()),
    }
}

/// Resolves `(slug, section)` into deduplicated lookup candidates.
///
/// Order: canonical key, legacy-separator alias, space-joined three-part
/// alias. Returns an empty list when `slug` is empty.
pub fn resolve(slug: &str, section: Option<&str>) -> Vec<String> {
    let Some(canonical) = canonical_key(slug, section) else {
        return Vec::new();
    };

    let mut candidates = vec![canonical.clone()];
    if let Some(alias) = legacy_alias(&canonical) {
        push_unique(&mut candidates, alias);
    }
    if let Some(alias) = spaced_name_alias(&canonical) {
        push_unique(&mut candidates, alias);
    }
    candidates
}

fn legacy_alias(key: &str) -> Option<String> {
    key.contains('-')
        .then(|| key.replacen('-', &LEGACY_SEPARATOR.to_string(), 1))
}

fn spaced_name_alias(key: &str) -> Option<String> {
    let captures = THREE_PART_KEY_RE.captures(key)?;
    Some(format!(
        "{}-{} {}",
        &captures[1], &captures[2], &captures[3]
    ))
}

fn push_unique(candidates: &mut Vec<String>, value: String) {
    if !candidates.contains(&value) {
        candidates.push(value);
    }
}
