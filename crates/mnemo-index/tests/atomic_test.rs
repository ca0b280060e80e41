//! Atomic save outcomes and pending-file recovery.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mnemo_core::MnemoError;
use mnemo_index::atomic::{SaveOptions, SaveOutcome, SaveRequest, TransactionManager};
use mnemo_index::recovery::{recover_all_pending, RecoveryOptions};

fn request(dir: &tempfile::TempDir, name: &str, content: &str) -> SaveRequest {
    SaveRequest {
        file_path: dir.path().join(name),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn successful_save_writes_file_and_indexes_once() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TransactionManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_in_fn = Arc::clone(&calls);
    let outcome = manager
        .execute_atomic_save(
            request(&dir, "note.md", "hello"),
            SaveOptions::default(),
            move |path| async move {
                assert!(path.exists(), "file must be on disk before indexing");
                calls_in_fn.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let written = tokio::fs::read_to_string(dir.path().join("note.md")).await.unwrap();
    assert_eq!(written, "hello");
    // No tmp residue.
    assert!(!dir.path().join("note.md.tmp").exists());
    assert_eq!(manager.metrics().success_count, 1);
}

#[tokio::test]
async fn failing_index_parks_file_as_pending() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TransactionManager::new();

    let outcome = manager
        .execute_atomic_save(
            request(&dir, "note.md", "hi"),
            SaveOptions::default(),
            |_path| async { Err(MnemoError::validation("index exploded")) },
        )
        .await
        .unwrap();

    let expected_pending = dir.path().join("note_pending.md");
    match outcome {
        SaveOutcome::Pending { pending_path, .. } => {
            assert_eq!(pending_path, expected_pending);
        }
        other => panic!("expected pending, got {other:?}"),
    }
    assert!(!dir.path().join("note.md").exists());
    let parked = tokio::fs::read_to_string(&expected_pending).await.unwrap();
    assert_eq!(parked, "hi");

    let metrics = manager.metrics();
    assert_eq!(metrics.pending_files_created, 1);
    assert_eq!(metrics.failure_count, 1);
    assert!(metrics.last_failure_reason.unwrap().contains("index exploded"));
}

#[tokio::test]
async fn failing_index_with_rollback_deletes_file() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TransactionManager::new();

    let outcome = manager
        .execute_atomic_save(
            request(&dir, "note.md", "hi"),
            SaveOptions {
                rollback_on_failure: true,
                create_pending_on_failure: false,
            },
            |_path| async { Err(MnemoError::validation("nope")) },
        )
        .await
        .unwrap();

    assert!(matches!(outcome, SaveOutcome::RolledBack { .. }));
    assert!(!dir.path().join("note.md").exists());
    assert!(!dir.path().join("note_pending.md").exists());
    assert_eq!(manager.metrics().rollback_count, 1);
}

#[tokio::test]
async fn failing_index_without_recovery_leaves_file() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TransactionManager::new();

    let outcome = manager
        .execute_atomic_save(
            request(&dir, "note.md", "kept"),
            SaveOptions {
                rollback_on_failure: false,
                create_pending_on_failure: false,
            },
            |_path| async { Err(MnemoError::validation("nope")) },
        )
        .await
        .unwrap();

    assert!(matches!(outcome, SaveOutcome::Failed { .. }));
    assert!(dir.path().join("note.md").exists());
}

#[tokio::test]
async fn save_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TransactionManager::new();
    let nested = SaveRequest {
        file_path: dir.path().join("a/b/c/note.md"),
        content: "deep".to_string(),
    };

    let outcome = manager
        .execute_atomic_save(nested, SaveOptions::default(), |_| async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Success);
    assert!(dir.path().join("a/b/c/note.md").exists());
}

#[tokio::test]
async fn recovery_reindexes_pending_files() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("one_pending.md"), "one").await.unwrap();
    tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();
    tokio::fs::write(dir.path().join("nested/two_pending.md"), "two")
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("normal.md"), "untouched").await.unwrap();

    let indexed: Arc<std::sync::Mutex<Vec<PathBuf>>> = Arc::default();
    let sink = Arc::clone(&indexed);
    let report = recover_all_pending(dir.path(), RecoveryOptions::default(), move |path| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(path);
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(report.found, 2);
    assert_eq!(report.recovered.len(), 2);
    assert!(report.requeued.is_empty());
    assert!(dir.path().join("one.md").exists());
    assert!(dir.path().join("nested/two.md").exists());
    assert!(!dir.path().join("one_pending.md").exists());
    assert_eq!(indexed.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn recovery_reparks_files_that_fail_again() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("bad_pending.md"), "bad").await.unwrap();

    let report = recover_all_pending(dir.path(), RecoveryOptions::default(), |_path| async {
        Err(MnemoError::validation("still broken"))
    })
    .await
    .unwrap();

    assert!(report.recovered.is_empty());
    assert_eq!(report.requeued.len(), 1);
    // Parked again for the next sweep; the original name is gone.
    assert!(dir.path().join("bad_pending.md").exists());
    assert!(!dir.path().join("bad.md").exists());
}

#[tokio::test]
async fn recovery_skips_hidden_and_dependency_dirs() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::create_dir(dir.path().join(".hidden")).await.unwrap();
    tokio::fs::write(dir.path().join(".hidden/a_pending.md"), "a")
        .await
        .unwrap();
    tokio::fs::create_dir(dir.path().join("node_modules")).await.unwrap();
    tokio::fs::write(dir.path().join("node_modules/b_pending.md"), "b")
        .await
        .unwrap();

    let report = recover_all_pending(dir.path(), RecoveryOptions::default(), |_| async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(report.found, 0);
}

#[tokio::test]
async fn recovery_respects_max_files_bound() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        tokio::fs::write(dir.path().join(format!("f{i}_pending.md")), "x")
            .await
            .unwrap();
    }

    let report = recover_all_pending(
        dir.path(),
        RecoveryOptions { max_files: 2 },
        |_| async { Ok(()) },
    )
    .await
    .unwrap();
    assert_eq!(report.found, 5);
    assert_eq!(report.recovered.len(), 2);
}
