//! Content synchronization and versioning engine.
//!
//! Keeps a locally cached, editable view of versioned content objects
//! consistent across editing surfaces, background server mutations, version
//! restores and unreliable network responses.
//!
//! Read path: resolver -> cache -> gateway (candidate keys, then full
//! listing) -> snapshot guard -> cache. Save path: gateway versioned write ->
//! snapshot guard -> cache -> `content-refreshed` broadcast.

pub mod bus;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod guard;
pub mod identity;
pub mod logging;
pub mod model;
pub mod service;
pub mod surface;

pub use bus::broadcast::{EventBus, Subscription, SubscriptionId};
pub use bus::event::{BroadcastEvent, EventKind};
pub use bus::throttle::{InFlightKeys, RefreshThrottle};
pub use cache::content_cache::{CacheValue, ContentCache, ALL_CONTENT_KEY};
pub use config::{ConfigError, EngineConfig};
pub use gateway::memory::InMemoryContentStore;
pub use gateway::remote::{GatewayError, GatewayResult, RemoteContentGateway, VersionTarget};
pub use gateway::transport::{
    ContentTransport, HttpTransport, TransportError, TransportMethod, TransportRequest,
    TransportResponse,
};
pub use guard::snapshot_guard::{Admission, GuardState, ReleaseReason, SnapshotGuard};
pub use identity::resolver::{canonical_key, resolve, LogicalKey};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::content::{ContentDraft, ContentId, ContentObject, DraftValidationError};
pub use model::version::ContentVersion;
pub use service::content_service::{
    ContentRead, ContentSyncService, FetchTicket, SyncError, SyncResult, DEFAULT_VERSION_NOTES,
};
pub use service::version_history::{
    preview_content, preview_version, HistorySubject, RestoreConfirmation, RestoreOutcome,
    VersionPreview,
};
pub use surface::capability::{
    CapabilityError, CapabilityProvider, StaticCapabilities, SurfaceCapability,
};
pub use surface::editor::{EditMode, EditingSurface};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
