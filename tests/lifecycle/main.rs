//! Integration tests for error propagation, lifecycle events and shutdown.

mod flaky;

#[cfg(feature = "emitter")]
use std::sync::{Arc, Mutex};

use flaky::FlakyBackend;
use level_model::{
    CloseReport, Level, Model, ModelsExt, ResolvedOptions, StoreError, StoreManager,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "emitter")]
use level_model::ModelEvent;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Model)]
#[model(collection = "note")]
struct Note {
    id: String,
    body: String,
}

fn note(id: &str) -> Note {
    Note {
        id: id.to_string(),
        body: format!("body {}", id),
    }
}

#[test]
fn scan_error_is_surfaced_once_then_stream_ends() {
    let level = Level::from_backend(FlakyBackend::failing_scans_after(2), ResolvedOptions::default());
    let notes = level.models::<Note>().unwrap();
    for id in ["1", "2", "3"] {
        notes.save(&note(id)).unwrap();
    }

    let results: Vec<_> = notes.all().unwrap().collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().id, "1");
    assert_eq!(results[1].as_ref().unwrap().id, "2");
    assert_eq!(
        results[2].as_ref().unwrap_err(),
        &StoreError::Storage("read stream failed".into())
    );

    let err = notes.all().unwrap().collect_all().unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)));
}

#[test]
fn remove_all_stops_at_first_error_without_rollback() {
    let level = Level::from_backend(FlakyBackend::failing_scans_after(2), ResolvedOptions::default());
    let notes = level.models::<Note>().unwrap();
    for id in ["1", "2", "3"] {
        notes.save(&note(id)).unwrap();
    }

    let err = notes.remove_all().unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)));

    // The first two deletions stay deleted
    assert_eq!(notes.len().unwrap(), 1);
    assert_eq!(notes.get("3").unwrap(), Some(note("3")));
}

#[cfg(feature = "emitter")]
#[test]
fn lifecycle_events_reach_listeners() {
    let level = Level::memory();
    let notes = level.models::<Note>().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for event in [ModelEvent::Save, ModelEvent::Remove, ModelEvent::Error] {
        let sink = Arc::clone(&seen);
        notes
            .on(event, move |payload| {
                sink.lock().unwrap().push((event, payload));
            })
            .unwrap();
    }

    notes.save(&note("1")).unwrap();
    notes.remove_key("1").unwrap();
    let _ = notes.save(&note(""));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].0, ModelEvent::Save);
    assert_eq!(seen[0].1, r#"{"body":"body 1","id":"1"}"#);
    assert_eq!(seen[1], (ModelEvent::Remove, "1".to_string()));
    assert_eq!(seen[2].0, ModelEvent::Error);
    assert!(seen[2].1.starts_with("invalid usage"));
}

#[cfg(feature = "emitter")]
#[test]
fn listeners_are_per_model_type() {
    #[derive(Clone, Debug, Serialize, Deserialize, Model)]
    struct Other {
        id: String,
    }

    let level = Level::memory();
    let notes = level.models::<Note>().unwrap();
    let others = level.models::<Other>().unwrap();
    let count = Arc::new(Mutex::new(0));

    let sink = Arc::clone(&count);
    let id = notes
        .on(ModelEvent::Save, move |_| *sink.lock().unwrap() += 1)
        .unwrap();

    others.save(&Other { id: "1".into() }).unwrap();
    notes.save(&note("1")).unwrap();
    assert_eq!(*count.lock().unwrap(), 1);

    assert!(notes.off(&id).unwrap());
    notes.save(&note("2")).unwrap();
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn manager_closes_everything_and_counts_failures() {
    let manager = StoreManager::new();
    let healthy = manager.register(Level::memory());
    let broken = manager.register(Level::from_backend(
        FlakyBackend::failing_flush(),
        ResolvedOptions::default(),
    ));
    let dir = tempfile::tempdir().unwrap();
    let on_disk = manager.open(dir.path().join("db")).unwrap();
    on_disk.models::<Note>().unwrap().save(&note("1")).unwrap();

    let report = manager.close_all();

    assert_eq!(report, CloseReport { closed: 2, failed: 1 });
    assert!(healthy.is_closed());
    assert!(broken.is_closed());
    assert!(on_disk.is_closed());
    assert!(manager.is_empty());
}

#[test]
fn close_all_releases_the_database_while_repositories_live() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");

    let manager = StoreManager::new();
    let level = manager.open(&path).unwrap();
    let notes = level.models::<Note>().unwrap();
    notes.save(&note("1")).unwrap();

    assert_eq!(manager.close_all(), CloseReport { closed: 1, failed: 0 });
    assert!(matches!(notes.get("1"), Err(StoreError::Closed(_))));

    // `notes` and `level` are still alive here
    let reopened = Level::open(&path).unwrap();
    let again = reopened.models::<Note>().unwrap();
    assert_eq!(again.get("1").unwrap(), Some(note("1")));
    drop(notes);
}

#[test]
fn collection_names_with_reserved_separator_are_rejected() {
    #[derive(Clone, Debug, Serialize, Deserialize, Model)]
    #[model(collection = "bad!name")]
    struct Bad {
        id: String,
    }

    let level = Level::memory();
    assert!(matches!(
        level.models::<Bad>(),
        Err(StoreError::InvalidUsage(_))
    ));
}

#[cfg(feature = "runtime")]
#[tokio::test]
async fn async_repository_matches_blocking_results() {
    let level = Level::memory();
    let notes = level.models::<Note>().unwrap().into_async();

    notes.save(note("1")).await.unwrap();
    notes.save(note("2")).await.unwrap();

    let all = notes.all().await.unwrap();
    assert_eq!(all, vec![note("1"), note("2")]);
    assert_eq!(notes.blocking().len().unwrap(), 2);

    assert_eq!(notes.remove_all().await.unwrap(), 2);
    assert_eq!(notes.get("1").await.unwrap(), None);
}
