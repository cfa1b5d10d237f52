//! Transport seam between the gateway and the remote content store.
//!
//! # Responsibility
//! - Carry method, path segments and JSON bodies to the store.
//! - Report transport failures separately from HTTP status outcomes.
//!
//! # Invariants
//! - A `TransportError` means no HTTP response was received.
//! - Path segments are encoded by the transport, never by callers.

use crate::config::EngineConfig;
use log::debug;
use reqwest::blocking::Client;
use reqwest::Url;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// HTTP verbs used against the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMethod {
    Get,
    Post,
    Patch,
}

impl TransportMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// One request against the store, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: TransportMethod,
    /// Unencoded path segments, e.g. `["content", "about us"]`.
    pub segments: Vec<String>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: TransportMethod::Get,
            segments: segments.into_iter().map(Into::into).collect(),
            body: None,
        }
    }

    pub fn with_body(
        method: TransportMethod,
        segments: Vec<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            method,
            segments,
            body: Some(body),
        }
    }

    /// Slash-joined path for diagnostics.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// Raw status and body returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before any HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout(String),
    Connect(String),
    InvalidUrl(String),
    Other(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(detail) => write!(f, "request timed out: {detail}"),
            Self::Connect(detail) => write!(f, "connection failed: {detail}"),
            Self::InvalidUrl(detail) => write!(f, "invalid request url: {detail}"),
            Self::Other(detail) => write!(f, "transport failure: {detail}"),
        }
    }
}

impl Error for TransportError {}

/// Sends requests to a remote content store.
pub trait ContentTransport: Send + Sync {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

impl<T: ContentTransport + ?Sized> ContentTransport for Arc<T> {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking HTTP transport with a per-request timeout.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Builds a transport from validated engine configuration.
    pub fn new(config: &EngineConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|err| TransportError::InvalidUrl(format!("{}: {err}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(config.base_url.clone()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| TransportError::Other(err.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, segments: &[String]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

impl ContentTransport for HttpTransport {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(&request.segments)?;
        debug!(
            "event=http_request module=gateway status=start method={} path={}",
            request.method.as_str(),
            request.path()
        );

        let builder = match request.method {
            TransportMethod::Get => self.client.get(url),
            TransportMethod::Post => self.client.post(url),
            TransportMethod::Patch => self.client.patch(url),
        };
        let builder = match &request.body {
            Some(body) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_string()),
            None => builder,
        };

        let response = builder.send().map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(map_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
