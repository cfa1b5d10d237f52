//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `contentsync_core` linkage.
//! - `demo` runs a save/list/restore round trip against the in-memory store;
//!   `remote <slug>` reads one key from the store named by `CONTENTSYNC_BASE_URL`.

use contentsync_core::{
    ContentDraft, ContentObject, ContentSyncService, EngineConfig, HttpTransport,
    InMemoryContentStore, RestoreConfirmation, RestoreOutcome,
};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    println!("contentsync_core ping={}", contentsync_core::ping());
    println!("contentsync_core version={}", contentsync_core::core_version());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        None => Ok(()),
        Some("demo") => run_demo(),
        Some("remote") => match args.get(1) {
            Some(slug) => run_remote(slug, args.get(2).map(String::as_str)),
            None => Err("usage: contentsync_cli remote <slug> [section]".to_string()),
        },
        Some(other) => Err(format!("unknown command `{other}`")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_demo() -> Result<(), String> {
    let store = Arc::new(InMemoryContentStore::new());
    store.seed(ContentObject::new("about", "About", "<p>hello</p>"));
    let service = ContentSyncService::create(Arc::clone(&store), &EngineConfig::default());

    let read = service.get_content("about", None);
    let title = read.value.map(|object| object.title).unwrap_or_default();
    println!("read about title={title}");

    for (title, notes) in [("About us", "retitle"), ("About the team", "expand")] {
        let saved = service
            .save_content("about", None, &ContentDraft::new(title, "<p>hello</p>"), Some(notes))
            .map_err(|err| err.to_string())?;
        println!("saved about title={}", saved.title);
    }

    let versions = service
        .list_versions_by_slug("about", None)
        .map_err(|err| err.to_string())?;
    for version in &versions {
        println!(
            "version number={} title={} notes={}",
            version.version_number,
            version.title,
            version.notes.as_deref().unwrap_or("-")
        );
    }

    let oldest = versions.last().ok_or("no versions recorded")?;
    match service
        .restore_version(oldest.id, RestoreConfirmation::Unconfirmed)
        .map_err(|err| err.to_string())?
    {
        RestoreOutcome::Restored(restored) => {
            println!("restored about title={}", restored.title)
        }
        RestoreOutcome::ConfirmationRequired(_) => println!("restore needs confirmation"),
    }
    service.dispose();
    Ok(())
}

fn run_remote(slug: &str, section: Option<&str>) -> Result<(), String> {
    let config = EngineConfig::from_env().map_err(|err| err.to_string())?;
    let transport = HttpTransport::new(&config).map_err(|err| err.to_string())?;
    let service = ContentSyncService::create(transport, &config);

    let read = service.get_content(slug, section);
    if let Some(err) = read.error {
        return Err(err.to_string());
    }
    match read.value {
        Some(object) => println!(
            "remote key={} id={} title={}",
            slug,
            object.id.map(|id| id.to_string()).unwrap_or_default(),
            object.title
        ),
        None => println!("remote key={slug} absent"),
    }
    Ok(())
}
