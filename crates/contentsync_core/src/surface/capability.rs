//! Viewer capabilities supplied by the host's authorization layer.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Gated surface features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SurfaceCapability {
    Edit,
    ViewHistory,
}

impl SurfaceCapability {
    /// Stable string id used by hosts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edit => SURFACE_CAPABILITY_EDIT,
            Self::ViewHistory => SURFACE_CAPABILITY_VIEW_HISTORY,
        }
    }

    /// User-facing short description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Edit => "Allow editing content and restoring earlier versions.",
            Self::ViewHistory => "Allow browsing and previewing the version history.",
        }
    }
}

pub const SURFACE_CAPABILITY_EDIT: &str = "edit";
pub const SURFACE_CAPABILITY_VIEW_HISTORY: &str = "view_history";

/// Parses one capability id.
pub fn parse_surface_capability(value: &str) -> Result<SurfaceCapability, CapabilityError> {
    match value.trim() {
        "" => Err(CapabilityError::EmptyCapability),
        SURFACE_CAPABILITY_EDIT => Ok(SurfaceCapability::Edit),
        SURFACE_CAPABILITY_VIEW_HISTORY => Ok(SurfaceCapability::ViewHistory),
        other => Err(CapabilityError::UnsupportedCapability(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    EmptyCapability,
    UnsupportedCapability(String),
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapability => write!(f, "surface capability value must not be empty"),
            Self::UnsupportedCapability(value) => {
                write!(f, "surface capability is unsupported: {value}")
            }
        }
    }
}

impl Error for CapabilityError {}

/// External authorization collaborator.
pub trait CapabilityProvider: Send + Sync {
    fn is_permitted(&self, capability: SurfaceCapability) -> bool;
}

/// Fixed grant set, e.g. resolved once per session by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticCapabilities {
    granted: BTreeSet<SurfaceCapability>,
}

impl StaticCapabilities {
    pub fn all() -> Self {
        Self::from_iter([SurfaceCapability::Edit, SurfaceCapability::ViewHistory])
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a grant set from capability ids; fails on the first bad id.
    pub fn from_strings(values: &[&str]) -> Result<Self, CapabilityError> {
        values
            .iter()
            .map(|value| parse_surface_capability(value))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(|granted| Self { granted })
    }
}

impl FromIterator<SurfaceCapability> for StaticCapabilities {
    fn from_iter<I: IntoIterator<Item = SurfaceCapability>>(iter: I) -> Self {
        Self {
            granted: iter.into_iter().collect(),
        }
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn is_permitted(&self, capability: SurfaceCapability) -> bool {
        self.granted.contains(&capability)
    }
}
