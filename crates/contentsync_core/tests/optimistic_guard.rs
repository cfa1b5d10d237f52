use contentsync_core::{
    BroadcastEvent, CacheValue, ContentDraft, ContentObject, ContentSyncService, EngineConfig,
    GuardState, InMemoryContentStore, LogicalKey,
};
use std::sync::Arc;

type Engine = Arc<ContentSyncService<Arc<InMemoryContentStore>>>;

fn engine_with(slug: &str, title: &str) -> (Arc<InMemoryContentStore>, Engine, LogicalKey) {
    let store = Arc::new(InMemoryContentStore::new());
    store.seed(ContentObject::new(slug, title, "body").with_id(11));
    let service = ContentSyncService::create(Arc::clone(&store), &EngineConfig::default());
    let key = LogicalKey::new(slug, None).expect("non-empty slug");
    (store, service, key)
}

fn cached_title(service: &Engine, key: &LogicalKey) -> Option<String> {
    service
        .cache()
        .get(key.canonical())
        .and_then(CacheValue::into_object)
        .map(|object| object.title)
}

#[test]
fn read_started_before_save_cannot_overwrite_saved_value() {
    let (_store, service, key) = engine_with("about", "Old");
    service.get_content_for_key(&key);

    let ticket = service.begin_fetch(&key);
    let stale = service.fetch_remote(&ticket);
    assert_eq!(
        stale.as_ref().ok().and_then(|o| o.as_ref()).map(|o| o.title.as_str()),
        Some("Old")
    );

    service
        .save(&key, &ContentDraft::new("Saved", "body"), None)
        .expect("save should succeed");

    let read = service.commit_fetch(ticket, stale);
    assert_eq!(read.value.map(|o| o.title), Some("Saved".to_string()));
    assert_eq!(cached_title(&service, &key), Some("Saved".to_string()));
}

#[test]
fn many_overlapping_stale_reads_all_yield_to_the_save() {
    let (_store, service, key) = engine_with("about", "Old");

    let mut pending = Vec::new();
    for _ in 0..4 {
        let ticket = service.begin_fetch(&key);
        let result = service.fetch_remote(&ticket);
        pending.push((ticket, result));
    }
    service
        .save(&key, &ContentDraft::new("Saved", "body"), None)
        .expect("save should succeed");

    for (ticket, result) in pending {
        service.commit_fetch(ticket, result);
        assert_eq!(cached_title(&service, &key), Some("Saved".to_string()));
    }
}

#[test]
fn held_snapshot_shadows_a_stale_result_from_a_fresh_ticket() {
    let (_store, service, key) = engine_with("about", "Old");
    let saved = service
        .save(&key, &ContentDraft::new("Saved", "body"), None)
        .expect("save should succeed");

    let ticket = service.begin_fetch(&key);
    let stale = ContentObject::new("about", "Old", "body").with_id(11);
    let read = service.commit_fetch(ticket, Ok(Some(stale)));

    assert_eq!(read.value, Some(saved.clone()));
    assert_eq!(service.guard().state("about"), GuardState::Held(saved));
}

#[test]
fn held_snapshot_shadows_a_fetched_absence() {
    let (_store, service, key) = engine_with("about", "Old");
    service
        .save(&key, &ContentDraft::new("Saved", "body"), None)
        .expect("save should succeed");

    let ticket = service.begin_fetch(&key);
    let read = service.commit_fetch(ticket, Ok(None));
    assert_eq!(read.value.map(|o| o.title), Some("Saved".to_string()));
}

#[test]
fn history_reset_event_releases_the_snapshot() {
    let (store, service, key) = engine_with("about", "Old");
    service
        .save(&key, &ContentDraft::new("Saved", "body"), None)
        .expect("save should succeed");
    assert!(service.guard().is_held("about"));

    service
        .bus()
        .publish(BroadcastEvent::version_history_reset(Some("about")));
    assert_eq!(service.guard().state("about"), GuardState::Empty);

    store.seed(ContentObject::new("about", "Server", "body").with_id(11));
    let read = service.refresh_key(&key);
    assert_eq!(read.value.map(|o| o.title), Some("Server".to_string()));
}

#[test]
fn keyless_history_reset_releases_every_snapshot() {
    let (store, service, about) = engine_with("about", "Old");
    store.seed(ContentObject::new("team", "Team", "body").with_id(12));
    let team = LogicalKey::new("team", None).expect("non-empty slug");
    service
        .save(&about, &ContentDraft::new("A", "body"), None)
        .expect("save should succeed");
    service
        .save(&team, &ContentDraft::new("T", "body"), None)
        .expect("save should succeed");

    service
        .bus()
        .publish(BroadcastEvent::version_history_reset(None));
    assert!(!service.guard().is_held("about"));
    assert!(!service.guard().is_held("team"));
}

#[test]
fn explicit_reset_and_key_release_clear_local_state() {
    let (_store, service, key) = engine_with("about", "Old");
    service
        .save(&key, &ContentDraft::new("Saved", "body"), None)
        .expect("save should succeed");

    assert!(service.reset_guard(&key));
    assert!(!service.reset_guard(&key));

    service
        .save(&key, &ContentDraft::new("Again", "body"), None)
        .expect("save should succeed");
    service.release_key(&key);
    assert!(!service.guard().is_held("about"));
    assert_eq!(service.cache().get("about"), None);
}

#[test]
fn read_overtaken_by_invalidation_commits_nothing() {
    let (_store, service, key) = engine_with("about", "Old");
    let ticket = service.begin_fetch(&key);
    let result = service.fetch_remote(&ticket);

    service.invalidate(Some(&key));
    service.commit_fetch(ticket, result);
    assert_eq!(service.cache().get("about"), None);
}

#[test]
fn outstanding_ticket_marks_the_key_as_loading() {
    let (_store, service, key) = engine_with("about", "Old");
    let ticket = service.begin_fetch(&key);
    assert!(service.peek(&key).is_loading);

    drop(ticket);
    assert!(!service.peek(&key).is_loading);
}

#[test]
fn failed_background_read_keeps_previous_value() {
    let (store, service, key) = engine_with("about", "Old");
    service.get_content_for_key(&key);

    store.set_offline(true);
    let read = service.refresh_key(&key);
    assert!(read.error.is_some());
    assert_eq!(read.value.map(|o| o.title), Some("Old".to_string()));
    assert_eq!(cached_title(&service, &key), Some("Old".to_string()));
}
