use contentsync_core::{
    CacheValue, ContentDraft, ContentObject, ContentSyncService, ContentTransport, EngineConfig,
    GatewayError, InMemoryContentStore, LogicalKey, SyncError, TransportError, TransportMethod,
    TransportRequest, TransportResponse, ALL_CONTENT_KEY,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

type Engine = Arc<ContentSyncService<Arc<InMemoryContentStore>>>;

fn engine() -> (Arc<InMemoryContentStore>, Engine) {
    let store = Arc::new(InMemoryContentStore::new());
    let service = ContentSyncService::create(Arc::clone(&store), &EngineConfig::default());
    (store, service)
}

fn key(slug: &str) -> LogicalKey {
    LogicalKey::new(slug, None).expect("non-empty slug")
}

#[test]
fn landscaping_scenario_reads_then_saves_with_version() {
    let (store, service) = engine();
    let slug = "vendors-landscaping-landscaping";
    store.seed(ContentObject::new(slug, "X", "Y").with_id(7));

    let read = service.get_content(slug, None);
    let loaded = read.value.expect("object should load");
    assert_eq!(loaded.id, Some(7));
    assert_eq!(loaded.title, "X");
    assert!(read.error.is_none());
    assert_eq!(
        service.cache().get(slug).and_then(CacheValue::into_object),
        Some(loaded)
    );

    let before = service
        .list_versions_by_slug(slug, None)
        .expect("listing should succeed");
    let previous_max = before.first().map(|v| v.version_number).unwrap_or(0);

    store.clear_requests();
    let saved = service
        .save_content(slug, None, &ContentDraft::new("Z", "Y"), Some("retitle"))
        .expect("save should succeed");
    assert_eq!(saved.title, "Z");

    let requests = store.requests();
    assert_eq!(requests.len(), 1, "known id means no extra lookup");
    assert_eq!(requests[0].method, TransportMethod::Patch);
    assert_eq!(requests[0].path(), "/content/7");
    let body = requests[0].body.as_ref().expect("patch body");
    assert_eq!(body["versionNotes"], "retitle");
    assert_eq!(body["createVersion"], true);

    let cached = service
        .cache()
        .get(slug)
        .and_then(CacheValue::into_object)
        .expect("cache should hold saved object");
    assert_eq!(cached.title, "Z");

    let after = service
        .list_versions_by_slug(slug, None)
        .expect("listing should succeed");
    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(after[0].version_number, previous_max + 1);
}

#[test]
fn second_read_is_served_from_cache() {
    let (store, service) = engine();
    store.seed(ContentObject::new("about", "About", "body"));

    service.get_content("about", None);
    let requests_after_first = store.requests().len();
    let read = service.get_content("about", Some("overview"));

    assert_eq!(read.value.map(|o| o.title), Some("About".to_string()));
    assert_eq!(store.requests().len(), requests_after_first);
}

#[test]
fn alias_candidate_finds_record_stored_with_spaced_name() {
    let (store, service) = engine();
    store.seed(ContentObject::new("vendors-landscaping landscaping", "Legacy", "body"));

    let read = service.get_content("vendors-landscaping-landscaping", None);
    assert_eq!(read.value.map(|o| o.title), Some("Legacy".to_string()));

    let paths: Vec<String> = store.requests().iter().map(|r| r.path()).collect();
    assert_eq!(
        paths,
        vec![
            "/content/vendors-landscaping-landscaping",
            "/content/vendors_landscaping-landscaping",
            "/content/vendors-landscaping landscaping",
        ]
    );
    assert!(service
        .cache()
        .get("vendors-landscaping-landscaping")
        .is_some());
}

#[test]
fn failed_direct_lookup_falls_back_to_listing_scan() {
    let (store, service) = engine();
    store.seed(ContentObject::new("about-team", "Team", "body"));
    store.fail_next(1);

    let read = service.get_content("about", Some("team"));
    assert_eq!(read.value.map(|o| o.title), Some("Team".to_string()));
    assert!(read.error.is_none());

    let last = store.requests().last().cloned().expect("requests recorded");
    assert_eq!(last.path(), "/content");
    assert!(matches!(
        service.cache().get(ALL_CONTENT_KEY),
        Some(CacheValue::Collection(_))
    ));
}

#[test]
fn confirmed_absence_is_cached_as_absent() {
    let (store, service) = engine();

    let read = service.get_content("missing", None);
    assert_eq!(read.value, None);
    assert_eq!(read.error, None);
    assert_eq!(service.cache().get("missing"), Some(CacheValue::Absent));

    let requests = store.requests().len();
    service.get_content("missing", None);
    assert_eq!(store.requests().len(), requests);
}

#[test]
fn failed_read_without_cache_entry_is_blank_and_not_cached() {
    let (store, service) = engine();
    store.seed(ContentObject::new("about", "About", "body"));
    store.set_offline(true);

    let read = service.get_content("about", None);
    assert_eq!(read.value, None);
    assert!(matches!(
        read.error,
        Some(SyncError::Gateway(GatewayError::Network(_)))
    ));
    assert!(read.error.as_ref().is_some_and(SyncError::is_retryable));
    assert_eq!(service.cache().get("about"), None);
}

#[test]
fn empty_slug_has_no_identity_and_touches_nothing() {
    let (store, service) = engine();

    let read = service.get_content("", Some("team"));
    assert_eq!(read.error, Some(SyncError::NoIdentity));
    let err = service
        .save_content(" ", None, &ContentDraft::new("t", "c"), None)
        .expect_err("save without identity must fail");
    assert_eq!(err, SyncError::NoIdentity);

    assert!(service.cache().is_empty());
    assert!(store.requests().is_empty());
}

#[test]
fn save_of_new_slug_creates_and_holds_snapshot() {
    let (store, service) = engine();

    let saved = service
        .save_content("careers", None, &ContentDraft::new("Careers", "join"), None)
        .expect("create should succeed");
    assert!(saved.id.is_some());
    assert_eq!(saved.slug, "careers");

    let methods: Vec<TransportMethod> = store.requests().iter().map(|r| r.method).collect();
    assert_eq!(methods.last(), Some(&TransportMethod::Post));
    assert!(service.guard().is_held("careers"));
    assert_eq!(
        service.cache().get("careers").and_then(CacheValue::into_object),
        Some(saved)
    );
}

#[test]
fn failed_save_leaves_cache_and_guard_untouched() {
    let (store, service) = engine();
    store.seed(ContentObject::new("about", "About", "body").with_id(3));
    let before = service.get_content("about", None).value;

    store.set_offline(true);
    let err = service
        .save_content("about", None, &ContentDraft::new("Changed", "body"), None)
        .expect_err("offline save must fail");
    assert!(err.is_retryable());

    assert_eq!(
        service.cache().get("about").and_then(CacheValue::into_object),
        before
    );
    assert!(!service.guard().is_held("about"));
}

#[test]
fn invalid_draft_is_rejected_before_any_request() {
    let (store, service) = engine();
    let err = service
        .save_content("about", None, &ContentDraft::new("  ", "body"), None)
        .expect_err("blank title must fail");
    assert!(matches!(err, SyncError::InvalidDraft(_)));
    assert!(store.requests().is_empty());
}

#[test]
fn invalidate_twice_equals_invalidate_once() {
    let (store, service) = engine();
    store.seed(ContentObject::new("about", "About", "body"));
    service.get_content("about", None);

    service.invalidate(Some(&key("about")));
    assert_eq!(service.cache().get("about"), None);
    service.invalidate(Some(&key("about")));
    assert_eq!(service.cache().get("about"), None);
}

#[test]
fn keyless_invalidation_clears_every_entry() {
    let (store, service) = engine();
    store.seed(ContentObject::new("about", "About", "body"));
    store.seed(ContentObject::new("team", "Team", "body"));
    service.get_content("about", None);
    service.get_content("team", None);

    service.invalidate(None);
    assert!(service.cache().is_empty());
}

#[test]
fn disposed_engine_rejects_operations() {
    let (store, service) = engine();
    store.seed(ContentObject::new("about", "About", "body"));
    service.get_content("about", None);

    service.dispose();
    assert!(service.is_disposed());
    assert!(service.bus().is_disposed());
    assert!(service.cache().is_empty());
    assert_eq!(
        service.get_content("about", None).error,
        Some(SyncError::Disposed)
    );
    let err = service
        .save_content("about", None, &ContentDraft::new("t", "c"), None)
        .expect_err("disposed engine must reject saves");
    assert_eq!(err, SyncError::Disposed);
}

/// Holds the next full listing until the test releases it.
struct GatedListing {
    inner: Arc<InMemoryContentStore>,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl ContentTransport for GatedListing {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let is_listing = request.method == TransportMethod::Get && request.segments == ["content"];
        let gate = if is_listing {
            self.gate.lock().expect("gate lock").take()
        } else {
            None
        };
        let response = self.inner.send(request);
        if let Some((arrived, release)) = gate {
            arrived.send(()).expect("test is waiting");
            release.recv().expect("test releases the listing");
        }
        response
    }
}

#[test]
fn listing_fetched_before_a_save_does_not_overwrite_the_collection() {
    let store = Arc::new(InMemoryContentStore::new());
    store.seed(ContentObject::new("about", "About", "body").with_id(5));
    let gated = Arc::new(GatedListing {
        inner: Arc::clone(&store),
        gate: Mutex::new(None),
    });
    let service = ContentSyncService::create(Arc::clone(&gated), &EngineConfig::default());

    assert!(service.get_content("nowhere", None).value.is_none());
    assert!(matches!(
        service.cache().get(ALL_CONTENT_KEY),
        Some(CacheValue::Collection(_))
    ));

    let (arrived_tx, arrived_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *gated.gate.lock().expect("gate lock") = Some((arrived_tx, release_rx));

    let reader = {
        let service = Arc::clone(&service);
        thread::spawn(move || service.get_content("missing-two", None))
    };
    arrived_rx.recv().expect("listing reached the store");

    let saved = service
        .save_content("about", None, &ContentDraft::new("Saved", "body"), None)
        .expect("save should succeed");
    assert_eq!(saved.title, "Saved");

    release_tx.send(()).expect("reader is waiting");
    let read = reader.join().expect("reader thread");
    assert!(read.value.is_none());

    let Some(CacheValue::Collection(listing)) = service.cache().get(ALL_CONTENT_KEY) else {
        panic!("collection should stay cached");
    };
    let about = listing
        .iter()
        .find(|item| item.id == Some(5))
        .expect("about is listed");
    assert_eq!(about.title, "Saved");
}
