//! Remote content gateway.
//!
//! # Responsibility
//! - Expose fetch-by-key, fetch-all, create, update-with-version and
//!   version listing over a [`ContentTransport`].
//! - Classify responses into [`GatewayError`] variants.
//!
//! # Invariants
//! - Stateless: no caching, no retries, no event emission.
//! - `update_with_version` always asks the store to record a version.

use crate::gateway::transport::{
    ContentTransport, TransportError, TransportMethod, TransportRequest, TransportResponse,
};
use crate::model::content::{ContentDraft, ContentId, ContentObject};
use crate::model::version::ContentVersion;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const CONTENT_SEGMENT: &str = "content";
const VERSIONS_SEGMENT: &str = "versions";
const MAX_ERROR_BODY_CHARS: usize = 200;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The addressed object does not exist (write paths only).
    NotFound(String),
    /// Transport-level failure; retryable.
    Network(TransportError),
    /// Non-success status with a body; needs user action.
    Remote { status: u16, body: String },
    /// Write payload rejected by the store.
    Validation(String),
    /// Success status whose body could not be decoded.
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether a caller may retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(target) => write!(f, "content not found: {target}"),
            Self::Network(err) => write!(f, "network error: {err}"),
            Self::Remote { status, body } => write!(f, "remote error {status}: {body}"),
            Self::Validation(message) => write!(f, "content rejected by store: {message}"),
            Self::InvalidResponse(message) => write!(f, "invalid store response: {message}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for GatewayError {
    fn from(value: TransportError) -> Self {
        Self::Network(value)
    }
}

/// Addressing mode for version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionTarget {
    ContentId(ContentId),
    Slug(String),
}

impl VersionTarget {
    fn segment(&self) -> String {
        match self {
            Self::ContentId(id) => id.to_string(),
            Self::Slug(slug) => slug.clone(),
        }
    }
}

/// Stateless client for the remote content store.
pub struct RemoteContentGateway<T: ContentTransport> {
    transport: T,
}

impl<T: ContentTransport> RemoteContentGateway<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches one object by lookup key. `Ok(None)` means the store has no
    /// object under that key.
    pub fn fetch_by_key(&self, key: &str) -> GatewayResult<Option<ContentObject>> {
        let request = TransportRequest::get([CONTENT_SEGMENT, key]);
        let response = self.send(&request)?;
        if response.status == 404 {
            return Ok(None);
        }
        ensure_success(&response)?;
        decode(&response).map(Some)
    }

    /// Fetches every object. Last-resort fallback for failed key lookups.
    pub fn fetch_all(&self) -> GatewayResult<Vec<ContentObject>> {
        let request = TransportRequest::get([CONTENT_SEGMENT]);
        let response = self.send(&request)?;
        ensure_success(&response)?;
        decode(&response)
    }

    /// Creates a new object under `slug`.
    pub fn create(&self, slug: &str, draft: &ContentDraft) -> GatewayResult<ContentObject> {
        let request = TransportRequest::with_body(
            TransportMethod::Post,
            vec![CONTENT_SEGMENT.to_string()],
            json!({
                "slug": slug,
                "title": draft.title,
                "content": draft.content,
            }),
        );
        let response = self.send(&request)?;
        ensure_write_success(&response, slug)?;
        decode(&response)
    }

    /// Updates an object and asks the store to record a version.
    ///
    /// Returns the object's new state, not the recorded version.
    pub fn update_with_version(
        &self,
        id: ContentId,
        draft: &ContentDraft,
        version_notes: &str,
    ) -> GatewayResult<ContentObject> {
        let request = TransportRequest::with_body(
            TransportMethod::Patch,
            vec![CONTENT_SEGMENT.to_string(), id.to_string()],
            json!({
                "title": draft.title,
                "content": draft.content,
                "createVersion": true,
                "versionNotes": version_notes,
            }),
        );
        let response = self.send(&request)?;
        ensure_write_success(&response, &id.to_string())?;
        decode(&response)
    }

    /// Lists versions in store order. `Ok(None)` when the parent is unknown.
    pub fn list_versions(
        &self,
        target: &VersionTarget,
    ) -> GatewayResult<Option<Vec<ContentVersion>>> {
        let request = TransportRequest::get([
            CONTENT_SEGMENT.to_string(),
            target.segment(),
            VERSIONS_SEGMENT.to_string(),
        ]);
        let response = self.send(&request)?;
        if response.status == 404 {
            return Ok(None);
        }
        ensure_success(&response)?;
        decode(&response).map(Some)
    }

    fn send(&self, request: &TransportRequest) -> GatewayResult<TransportResponse> {
        let started_at = Instant::now();
        match self.transport.send(request) {
            Ok(response) => {
                debug!(
                    "event=gateway_call module=gateway status=ok method={} path={} http_status={} duration_ms={}",
                    request.method.as_str(),
                    request.path(),
                    response.status,
                    started_at.elapsed().as_millis()
                );
                Ok(response)
            }
            Err(err) => {
                warn!(
                    "event=gateway_call module=gateway status=error method={} path={} duration_ms={} error={}",
                    request.method.as_str(),
                    request.path(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }
}

fn ensure_success(response: &TransportResponse) -> GatewayResult<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(GatewayError::Remote {
        status: response.status,
        body: truncate_body(&response.body),
    })
}

fn ensure_write_success(response: &TransportResponse, target: &str) -> GatewayResult<()> {
    match response.status {
        400 | 422 => Err(GatewayError::Validation(truncate_body(&response.body))),
        404 => Err(GatewayError::NotFound(target.to_string())),
        _ => ensure_success(response),
    }
}

fn decode<V: DeserializeOwned>(response: &TransportResponse) -> GatewayResult<V> {
    serde_json::from_str(&response.body)
        .map_err(|err| GatewayError::InvalidResponse(err.to_string()))
}

fn truncate_body(body: &str) -> String {
    let mut truncated = body.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        truncated.push_str("...");
    }
    truncated
}
