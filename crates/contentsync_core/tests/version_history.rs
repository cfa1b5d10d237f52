use contentsync_core::{
    BroadcastEvent, CacheValue, ContentDraft, ContentObject, ContentSyncService, EngineConfig,
    EventKind, HistorySubject, InMemoryContentStore, LogicalKey, RestoreConfirmation,
    RestoreOutcome, SyncError, TransportMethod, ALL_CONTENT_KEY,
};
use std::sync::{Arc, Mutex};

type Engine = Arc<ContentSyncService<Arc<InMemoryContentStore>>>;

const SLUG: &str = "services-landscaping";

fn engine() -> (Arc<InMemoryContentStore>, Engine, LogicalKey) {
    let store = Arc::new(InMemoryContentStore::new());
    store.seed(ContentObject::new(SLUG, "Initial", "<p>v0</p>").with_id(7));
    let service = ContentSyncService::create(Arc::clone(&store), &EngineConfig::default());
    let key = LogicalKey::new(SLUG, None).expect("non-empty slug");
    (store, service, key)
}

fn save_n(service: &Engine, key: &LogicalKey, n: u32) {
    for i in 1..=n {
        service
            .save(
                key,
                &ContentDraft::new(format!("Title {i}"), format!("<p>v{i}</p>")),
                Some(&format!("edit {i}")),
            )
            .expect("save should succeed");
    }
}

#[test]
fn consecutive_saves_produce_consecutive_version_numbers() {
    let (_store, service, key) = engine();
    save_n(&service, &key, 4);

    let versions = service
        .list_versions(&HistorySubject::Key(key.clone()))
        .expect("listing should succeed");
    let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![4, 3, 2, 1]);
    assert_eq!(versions[0].notes.as_deref(), Some("edit 4"));
}

#[test]
fn newest_version_matches_parent_after_save() {
    let (store, service, key) = engine();
    save_n(&service, &key, 2);

    let versions = service
        .list_versions(&HistorySubject::ContentId(7))
        .expect("listing should succeed");
    let parent = store.object(7).expect("parent exists");
    assert_eq!(versions[0].title, parent.title);
    assert_eq!(versions[0].content, parent.content);
}

#[test]
fn save_without_notes_uses_default_notes() {
    let (store, service, key) = engine();
    service
        .save(&key, &ContentDraft::new("T", "c"), Some("   "))
        .expect("save should succeed");
    let versions = store.versions_for(7);
    assert_eq!(
        versions[0].notes.as_deref(),
        Some(contentsync_core::DEFAULT_VERSION_NOTES)
    );
}

#[test]
fn unknown_parent_lists_no_versions() {
    let (_store, service, _key) = engine();
    let versions = service
        .list_versions_by_slug("nowhere", None)
        .expect("listing should succeed");
    assert!(versions.is_empty());
}

#[test]
fn restore_writes_the_old_state_as_a_new_version() {
    let (store, service, key) = engine();
    save_n(&service, &key, 3);
    let versions = service
        .list_versions(&HistorySubject::Key(key.clone()))
        .expect("listing should succeed");
    let first = versions
        .iter()
        .find(|v| v.version_number == 1)
        .cloned()
        .expect("version 1 listed");

    let refreshed: Arc<Mutex<Vec<BroadcastEvent>>> = Arc::default();
    let sink = Arc::clone(&refreshed);
    let _sub = service.subscribe(EventKind::ContentRefreshed, move |event| {
        sink.lock().expect("sink lock").push(event.clone());
    });

    let outcome = service
        .restore_version(first.id, RestoreConfirmation::Unconfirmed)
        .expect("restore should succeed");
    let RestoreOutcome::Restored(restored) = outcome else {
        panic!("plain markup should not need confirmation");
    };
    assert_eq!(restored.title, first.title);
    assert_eq!(restored.content, first.content);

    let parent = store.object(7).expect("parent exists");
    assert_eq!(parent.content, first.content);

    let after = service
        .list_versions(&HistorySubject::Key(key.clone()))
        .expect("listing should succeed");
    assert_eq!(after[0].version_number, 4);
    assert_eq!(after[0].content, first.content);
    assert_eq!(after[0].notes.as_deref(), Some("Restored from version 1"));

    assert!(service.guard().is_held(SLUG));
    assert_eq!(
        service.cache().get(SLUG).and_then(CacheValue::into_object),
        Some(restored.clone())
    );
    let events = refreshed.lock().expect("sink lock");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, Some(restored));
}

#[test]
fn restore_publishes_history_reset_before_refresh() {
    let (_store, service, key) = engine();
    save_n(&service, &key, 2);
    let versions = service
        .list_versions(&HistorySubject::Key(key))
        .expect("listing should succeed");

    let seen: Arc<Mutex<Vec<EventKind>>> = Arc::default();
    let subs: Vec<_> = [EventKind::VersionHistoryReset, EventKind::ContentRefreshed]
        .into_iter()
        .map(|kind| {
            let sink = Arc::clone(&seen);
            service.subscribe(kind, move |event| {
                sink.lock().expect("sink lock").push(event.kind);
            })
        })
        .collect();

    service
        .restore_version(versions[1].id, RestoreConfirmation::Unconfirmed)
        .expect("restore should succeed");
    assert_eq!(
        *seen.lock().expect("sink lock"),
        vec![EventKind::VersionHistoryReset, EventKind::ContentRefreshed]
    );
    drop(subs);
}

#[test]
fn corrupted_version_requires_confirmation() {
    let (store, service, key) = engine();
    let broken = store.seed_version(7, "Broken", "[invalid json", None);
    service
        .list_versions(&HistorySubject::Key(key))
        .expect("listing should succeed");

    let preview = service
        .preview_listed(broken.id)
        .expect("version was listed");
    assert!(preview.corrupted);
    assert_eq!(preview.formatted, "[invalid json");

    store.clear_requests();
    let outcome = service
        .restore_version(broken.id, RestoreConfirmation::Unconfirmed)
        .expect("restore call should succeed");
    assert!(matches!(outcome, RestoreOutcome::ConfirmationRequired(p) if p.corrupted));
    assert!(store
        .requests()
        .iter()
        .all(|request| request.method != TransportMethod::Patch));

    let outcome = service
        .restore_version(broken.id, RestoreConfirmation::Confirmed)
        .expect("confirmed restore should succeed");
    let RestoreOutcome::Restored(restored) = outcome else {
        panic!("confirmed restore should proceed");
    };
    assert_eq!(restored.content, "[invalid json");
}

#[test]
fn structured_version_previews_pretty_printed() {
    let (store, service, key) = engine();
    let structured = store.seed_version(7, "Blocks", r#"[{"type":"p","text":"hi"}]"#, None);
    service
        .list_versions(&HistorySubject::Key(key))
        .expect("listing should succeed");

    let preview = service
        .preview_listed(structured.id)
        .expect("version was listed");
    assert!(!preview.corrupted);
    assert!(preview.formatted.contains("\"type\": \"p\""));
}

#[test]
fn unlisted_version_is_rejected() {
    let (_store, service, _key) = engine();
    assert_eq!(
        service.restore_version(999, RestoreConfirmation::Confirmed),
        Err(SyncError::UnknownVersion(999))
    );
    assert_eq!(
        service.preview_listed(999),
        Err(SyncError::UnknownVersion(999))
    );
}

#[test]
fn failed_restore_write_changes_nothing() {
    let (store, service, key) = engine();
    save_n(&service, &key, 2);
    let versions = service
        .list_versions(&HistorySubject::Key(key))
        .expect("listing should succeed");
    let before = service.cache().get(SLUG);

    store.set_offline(true);
    let err = service
        .restore_version(versions[1].id, RestoreConfirmation::Unconfirmed)
        .expect_err("offline restore must fail");
    assert!(err.is_retryable());
    assert_eq!(service.cache().get(SLUG), before);
    assert!(service.guard().is_held(SLUG));
}

#[test]
fn restore_with_failing_key_lookups_rereads_a_fresh_listing() {
    let (store, service, key) = engine();
    save_n(&service, &key, 2);

    store.fail_key_lookups(true);
    let primed = service.get_content("nowhere", None);
    assert!(primed.value.is_none());
    let Some(CacheValue::Collection(listing)) = service.cache().get(ALL_CONTENT_KEY) else {
        panic!("fallback scan should cache the listing");
    };
    assert_eq!(listing[0].title, "Title 2");

    let versions = service
        .list_versions(&HistorySubject::Key(key.clone()))
        .expect("listing should succeed");
    let first = versions
        .iter()
        .find(|v| v.version_number == 1)
        .cloned()
        .expect("version 1 listed");

    let outcome = service
        .restore_version(first.id, RestoreConfirmation::Unconfirmed)
        .expect("restore should fall back to the listing");
    let RestoreOutcome::Restored(restored) = outcome else {
        panic!("plain markup should not need confirmation");
    };
    assert_eq!(restored.title, "Title 1");
    assert_eq!(store.object(7).expect("parent exists").title, "Title 1");
    assert_eq!(
        service
            .cache()
            .get(SLUG)
            .and_then(CacheValue::into_object)
            .map(|object| object.title),
        Some("Title 1".to_string())
    );
    let Some(CacheValue::Collection(listing)) = service.cache().get(ALL_CONTENT_KEY) else {
        panic!("listing should stay cached");
    };
    assert_eq!(listing[0].title, "Title 1");
}

#[test]
fn restore_by_parent_lists_history_on_a_fresh_engine() {
    let (store, service, key) = engine();
    save_n(&service, &key, 2);
    let first = store
        .versions_for(7)
        .into_iter()
        .find(|v| v.version_number == 1)
        .expect("version 1 stored");

    let fresh = ContentSyncService::create(Arc::clone(&store), &EngineConfig::default());
    assert_eq!(
        fresh.restore_version(first.id, RestoreConfirmation::Unconfirmed),
        Err(SyncError::UnknownVersion(first.id))
    );

    let outcome = fresh
        .restore_version_of(
            &HistorySubject::ContentId(7),
            first.id,
            RestoreConfirmation::Unconfirmed,
        )
        .expect("restore should list then succeed");
    let RestoreOutcome::Restored(restored) = outcome else {
        panic!("plain markup should not need confirmation");
    };
    assert_eq!(restored.title, "Title 1");
    assert!(fresh.guard().is_held(SLUG));
}

#[test]
fn restore_by_parent_rejects_foreign_version() {
    let (store, service, _key) = engine();
    store.seed(ContentObject::new("other", "Other", "").with_id(8));
    let foreign = store.seed_version(8, "Other v1", "<p>x</p>", None);

    assert_eq!(
        service.restore_version_of(
            &HistorySubject::ContentId(7),
            foreign.id,
            RestoreConfirmation::Confirmed,
        ),
        Err(SyncError::UnknownVersion(foreign.id))
    );
    assert_eq!(store.object(7).expect("parent exists").title, "Initial");
}
