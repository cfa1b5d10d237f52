//! In-memory remote content store.
//!
//! Speaks the same request contract as the HTTP store so the full engine can
//! run without a network: object lookup by slug, full listing, creation,
//! versioned updates and version listing by id or slug.
//!
//! # Invariants
//! - Ids and version numbers are assigned here, never by callers.
//! - A `PATCH` with `createVersion=true` records the post-update state as
//!   the next version (`max + 1`), so the newest version always equals the
//!   current object.

use crate::gateway::transport::{
    ContentTransport, TransportError, TransportMethod, TransportRequest, TransportResponse,
};
use crate::model::content::{ContentId, ContentObject};
use crate::model::version::ContentVersion;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<ContentId, ContentObject>,
    versions: Vec<ContentVersion>,
    next_content_id: ContentId,
    next_version_id: i64,
    offline: bool,
    pending_failures: u32,
    key_lookups_failing: bool,
    requests: Vec<TransportRequest>,
}

/// Thread-safe fake of the remote content store.
#[derive(Default)]
pub struct InMemoryContentStore {
    state: Mutex<StoreState>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object, assigning an id when it has none.
    pub fn seed(&self, mut object: ContentObject) -> ContentObject {
        let mut state = self.lock();
        let id = match object.id {
            Some(id) => id,
            None => state.allocate_content_id(),
        };
        state.next_content_id = state.next_content_id.max(id);
        object.id = Some(id);
        if object.created_at.is_none() {
            object.created_at = Some(now_millis().to_string());
        }
        state.objects.insert(id, object.clone());
        object
    }

    /// Appends a raw version row, bypassing update semantics.
    pub fn seed_version(
        &self,
        content_id: ContentId,
        title: &str,
        content: &str,
        notes: Option<&str>,
    ) -> ContentVersion {
        let mut state = self.lock();
        state.record_version(content_id, title, content, notes.map(str::to_string))
    }

    /// Current object state by id.
    pub fn object(&self, id: ContentId) -> Option<ContentObject> {
        self.lock().objects.get(&id).cloned()
    }

    /// Versions for one parent in recording order.
    pub fn versions_for(&self, id: ContentId) -> Vec<ContentVersion> {
        self.lock()
            .versions
            .iter()
            .filter(|version| version.content_id == id)
            .cloned()
            .collect()
    }

    /// Simulates a transport outage for every request until reset.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Fails the next `count` requests with a connection error.
    pub fn fail_next(&self, count: u32) {
        self.lock().pending_failures = count;
    }

    /// Fails `GET /content/{key}` with a connection error while set; the
    /// listing and every other route keep working.
    pub fn fail_key_lookups(&self, failing: bool) {
        self.lock().key_lookups_failing = failing;
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ContentTransport for InMemoryContentStore {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        if state.offline {
            return Err(TransportError::Connect("store offline".to_string()));
        }
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(TransportError::Connect("injected failure".to_string()));
        }

        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
        if state.key_lookups_failing
            && request.method == TransportMethod::Get
            && matches!(segments.as_slice(), ["content", _])
        {
            return Err(TransportError::Connect("key lookup unavailable".to_string()));
        }
        let response = match (request.method, segments.as_slice()) {
            (TransportMethod::Get, ["content"]) => {
                let objects: Vec<&ContentObject> = state.objects.values().collect();
                json_response(200, &objects)
            }
            (TransportMethod::Get, ["content", key]) => match state.find_by_slug(key) {
                Some(object) => json_response(200, object),
                None => TransportResponse::new(404, format!("no content for key {key}")),
            },
            (TransportMethod::Get, ["content", target, "versions"]) => {
                match state.resolve_parent(target) {
                    Some(id) => {
                        let versions: Vec<&ContentVersion> = state
                            .versions
                            .iter()
                            .filter(|version| version.content_id == id)
                            .collect();
                        json_response(200, &versions)
                    }
                    None => TransportResponse::new(404, format!("no content for {target}")),
                }
            }
            (TransportMethod::Post, ["content"]) => state.create(request.body.as_ref()),
            (TransportMethod::Patch, ["content", id]) => match id.parse::<ContentId>() {
                Ok(id) => state.update(id, request.body.as_ref()),
                Err(_) => TransportResponse::new(400, format!("invalid content id {id}")),
            },
            _ => TransportResponse::new(405, format!("unsupported route {}", request.path())),
        };
        Ok(response)
    }
}

impl StoreState {
    fn allocate_content_id(&mut self) -> ContentId {
        self.next_content_id += 1;
        self.next_content_id
    }

    fn find_by_slug(&self, slug: &str) -> Option<&ContentObject> {
        self.objects.values().find(|object| object.slug == slug)
    }

    fn resolve_parent(&self, target: &str) -> Option<ContentId> {
        if let Ok(id) = target.parse::<ContentId>() {
            if self.objects.contains_key(&id) {
                return Some(id);
            }
        }
        self.find_by_slug(target).and_then(|object| object.id)
    }

    fn record_version(
        &mut self,
        content_id: ContentId,
        title: &str,
        content: &str,
        notes: Option<String>,
    ) -> ContentVersion {
        let version_number = self
            .versions
            .iter()
            .filter(|version| version.content_id == content_id)
            .map(|version| version.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        self.next_version_id += 1;
        let version = ContentVersion {
            id: self.next_version_id,
            content_id,
            version_number,
            title: title.to_string(),
            content: content.to_string(),
            created_at: Some(now_millis().to_string()),
            notes,
        };
        self.versions.push(version.clone());
        version
    }

    fn create(&mut self, body: Option<&Value>) -> TransportResponse {
        let Some(body) = body else {
            return TransportResponse::new(400, "missing request body");
        };
        let slug = string_field(body, "slug").unwrap_or_default();
        if slug.trim().is_empty() {
            return TransportResponse::new(422, "slug is required");
        }
        if self.find_by_slug(&slug).is_some() {
            return TransportResponse::new(409, format!("slug already exists: {slug}"));
        }

        let id = self.allocate_content_id();
        let object = ContentObject {
            id: Some(id),
            slug,
            title: string_field(body, "title").unwrap_or_default(),
            content: string_field(body, "content").unwrap_or_default(),
            created_at: Some(now_millis().to_string()),
        };
        self.objects.insert(id, object.clone());
        json_response(201, &object)
    }

    fn update(&mut self, id: ContentId, body: Option<&Value>) -> TransportResponse {
        let Some(body) = body else {
            return TransportResponse::new(400, "missing request body");
        };
        let Some(object) = self.objects.get_mut(&id) else {
            return TransportResponse::new(404, format!("no content with id {id}"));
        };

        if let Some(title) = string_field(body, "title") {
            object.title = title;
        }
        if let Some(content) = string_field(body, "content") {
            object.content = content;
        }
        let updated = object.clone();

        if body.get("createVersion").and_then(Value::as_bool) == Some(true) {
            let notes = string_field(body, "versionNotes").filter(|notes| !notes.is_empty());
            self.record_version(id, &updated.title, &updated.content, notes);
        }
        json_response(200, &updated)
    }
}

fn string_field(body: &Value, field: &str) -> Option<String> {
    body.get(field).and_then(Value::as_str).map(str::to_string)
}

fn json_response<V: Serialize + ?Sized>(status: u16, value: &V) -> TransportResponse {
    match serde_json::to_string(value) {
        Ok(body) => TransportResponse::new(status, body),
        Err(err) => TransportResponse::new(500, format!("serialization failed: {err}")),
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::InMemoryContentStore;
    use crate::gateway::remote::{GatewayError, RemoteContentGateway, VersionTarget};
    use crate::model::content::{ContentDraft, ContentObject};
    use std::sync::Arc;

    #[test]
    fn versioned_updates_number_from_one_without_gaps() {
        let store = Arc::new(InMemoryContentStore::new());
        store.seed(ContentObject::new("about", "About", "v0").with_id(7));
        let gateway = RemoteContentGateway::new(Arc::clone(&store));

        for n in 1..=3 {
            gateway
                .update_with_version(7, &ContentDraft::new("About", format!("v{n}")), "")
                .expect("update should succeed");
        }

        let versions = gateway
            .list_versions(&VersionTarget::ContentId(7))
            .expect("listing should succeed")
            .expect("parent exists");
        let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(versions[2].content, "v3");
    }

    #[test]
    fn create_assigns_next_id_and_rejects_blank_slug() {
        let store = Arc::new(InMemoryContentStore::new());
        store.seed(ContentObject::new("existing", "E", "").with_id(41));
        let gateway = RemoteContentGateway::new(Arc::clone(&store));

        let created = gateway
            .create("fresh", &ContentDraft::new("Fresh", "body"))
            .expect("create should succeed");
        assert_eq!(created.id, Some(42));

        let err = gateway
            .create(" ", &ContentDraft::new("Blank", ""))
            .expect_err("blank slug must be rejected");
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn offline_store_fails_with_network_error() {
        let store = Arc::new(InMemoryContentStore::new());
        store.set_offline(true);
        let gateway = RemoteContentGateway::new(Arc::clone(&store));
        let err = gateway.fetch_by_key("about").expect_err("offline must fail");
        assert!(err.is_retryable());
        assert_eq!(store.requests().len(), 1);
    }

    #[test]
    fn version_listing_for_unknown_parent_is_none() {
        let store = Arc::new(InMemoryContentStore::new());
        let gateway = RemoteContentGateway::new(Arc::clone(&store));
        let listing = gateway
            .list_versions(&VersionTarget::Slug("ghost".to_string()))
            .expect("404 is not an error");
        assert!(listing.is_none());
    }

    #[test]
    fn failing_key_lookups_leave_listing_available() {
        let store = Arc::new(InMemoryContentStore::new());
        store.seed(ContentObject::new("about", "About", "").with_id(3));
        store.fail_key_lookups(true);
        let gateway = RemoteContentGateway::new(Arc::clone(&store));

        let err = gateway.fetch_by_key("about").expect_err("key lookup must fail");
        assert!(err.is_retryable());
        let all = gateway.fetch_all().expect("listing should succeed");
        assert_eq!(all.len(), 1);

        store.fail_key_lookups(false);
        assert!(gateway
            .fetch_by_key("about")
            .expect("lookup should succeed")
            .is_some());
    }
}
