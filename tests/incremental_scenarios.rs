// End-to-end incremental indexing behaviour against real directory trees
use repolens::storage::IndexStore;
use repolens::{CancellationToken, RepoLens, RepoLensError, ScanGeneration};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn auth_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "auth/login.py", "import session\n\n\ndef login(user):\n    return session.start(user)\n");
    write(dir.path(), "auth/session.py", "def session():\n    pass\n");
    write(dir.path(), "web/app.js", "import { login } from '../auth/login';\nexport function boot() {}\n");
    dir
}

fn lens() -> RepoLens {
    RepoLens::builder().enable_cache(false).workers(2).grace_generations(1).build().unwrap()
}

fn store_of(lens: &RepoLens) -> IndexStore {
    lens.index().read().clone()
}

#[test]
fn test_rescan_of_unchanged_tree_is_a_no_op() {
    let repo = auth_repo();
    let lens = lens();

    let first = lens.scan_blocking(repo.path()).unwrap();
    assert_eq!(first.added.len(), 3);
    let before = store_of(&lens);

    let second = lens.scan_blocking(repo.path()).unwrap();
    assert!(!second.has_changes());
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.generation, first.generation);
    assert_eq!(store_of(&lens), before);
}

#[test]
fn test_modifying_one_file_touches_only_that_file() {
    let repo = auth_repo();
    let lens = lens();
    lens.scan_blocking(repo.path()).unwrap();
    let login_before = lens.index().read().lookup("auth/login.py").cloned().unwrap();

    write(repo.path(), "auth/session.py", "def session():\n    return {}\n\n\ndef refresh():\n    pass\n");
    let report = lens.scan_blocking(repo.path()).unwrap();

    assert_eq!(report.modified, vec!["auth/session.py"]);
    assert!(report.added.is_empty());
    assert!(report.removed.is_empty());

    let index = lens.index();
    let store = index.read();
    // Untouched files keep the record from the generation that indexed them
    assert_eq!(store.lookup("auth/login.py"), Some(&login_before));
    assert_eq!(store.symbol_search("refresh").into_iter().collect::<Vec<_>>(), vec!["auth/session.py"]);
    assert!(store.check_consistency().is_ok());
}

#[test]
fn test_remove_then_restore_round_trip() {
    let repo = auth_repo();
    let lens = lens();
    lens.scan_blocking(repo.path()).unwrap();
    let record = lens.index().read().lookup("auth/session.py").cloned().unwrap();
    let facts = lens.index().read().facts("auth/session.py").cloned().unwrap();
    let content = fs::read(repo.path().join("auth/session.py")).unwrap();

    fs::remove_file(repo.path().join("auth/session.py")).unwrap();
    let report = lens.scan_blocking(repo.path()).unwrap();
    assert_eq!(report.removed, vec!["auth/session.py"]);
    {
        let index = lens.index();
        let store = index.read();
        assert!(store.lookup("auth/session.py").is_none());
        assert!(store.symbol_search("session").is_empty());
        assert!(store.tombstone("auth/session.py").is_some());
    }

    fs::write(repo.path().join("auth/session.py"), content).unwrap();
    let report = lens.scan_blocking(repo.path()).unwrap();
    assert_eq!(report.added, vec!["auth/session.py"]);

    let index = lens.index();
    let store = index.read();
    let restored = store.lookup("auth/session.py").unwrap();
    assert_eq!(restored.digest, record.digest);
    assert_eq!(store.facts("auth/session.py"), Some(&facts));
    assert!(store.tombstone("auth/session.py").is_none());
}

#[test]
fn test_generations_are_monotonic() {
    let repo = auth_repo();
    let lens = lens();

    let mut last = ScanGeneration::default();
    for round in 0..4 {
        write(repo.path(), &format!("extra/file_{}.rs", round), "pub fn extra() {}\n");
        let report = lens.scan_blocking(repo.path()).unwrap();
        assert!(report.generation > last, "round {} did not advance", round);
        last = report.generation;
    }
    assert_eq!(lens.stats().generation, last);
}

#[test]
fn test_tombstones_are_purged_after_grace() {
    let repo = auth_repo();
    let lens = lens();
    lens.scan_blocking(repo.path()).unwrap();

    fs::remove_file(repo.path().join("web/app.js")).unwrap();
    lens.scan_blocking(repo.path()).unwrap();
    assert!(lens.index().read().tombstone("web/app.js").is_some());

    // Unchanged passes do not age tombstones
    lens.scan_blocking(repo.path()).unwrap();
    assert!(lens.index().read().tombstone("web/app.js").is_some());

    write(repo.path(), "later.py", "x = 1\n");
    let report = lens.scan_blocking(repo.path()).unwrap();
    assert!(report.tombstones_purged >= 1);
    assert!(lens.index().read().tombstone("web/app.js").is_none());
}

#[test]
fn test_scan_subtree_leaves_other_paths_alone() {
    let repo = auth_repo();
    let lens = lens();
    lens.scan_blocking(repo.path()).unwrap();

    fs::remove_file(repo.path().join("web/app.js")).unwrap();
    write(repo.path(), "auth/logout.py", "def logout():\n    pass\n");

    let report = lens.scan_subtree("auth").unwrap();
    assert_eq!(report.added, vec!["auth/logout.py"]);
    assert!(report.removed.is_empty());
    assert!(lens.index().read().contains("web/app.js"));
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_keeps_previous_records() {
    use std::os::unix::fs::PermissionsExt;

    let repo = auth_repo();
    let lens = lens();
    lens.scan_blocking(repo.path()).unwrap();
    let before = lens.index().read().lookup("auth/session.py").cloned().unwrap();

    let auth = repo.path().join("auth");
    fs::set_permissions(&auth, fs::Permissions::from_mode(0o000)).unwrap();
    // Root can read anything; the skip path only runs when the permission change took effect.
    let readable = fs::read_dir(&auth).is_ok();
    let report = lens.scan_blocking(repo.path());
    fs::set_permissions(&auth, fs::Permissions::from_mode(0o755)).unwrap();
    let report = report.unwrap();

    assert!(report.removed.is_empty());
    if !readable {
        assert!(report.skipped.iter().any(|issue| issue.path == "auth"));
    }
    let index = lens.index();
    let store = index.read();
    assert_eq!(store.lookup("auth/session.py"), Some(&before));
    assert!(store.contains("auth/login.py"));
    assert!(store.tombstone("auth/session.py").is_none());
    assert!(store.check_consistency().is_ok());
}

#[test]
fn test_cancelled_scan_reports_cancellation() {
    let repo = auth_repo();
    let lens = lens();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = lens.scan_blocking_with_cancel(repo.path(), &cancel);
    assert!(matches!(result, Err(RepoLensError::Cancelled)));

    // A later pass without cancellation completes normally
    let report = lens.scan_blocking(repo.path()).unwrap();
    assert_eq!(report.files_indexed() + report.unchanged, 3);
}

#[test]
fn test_queries_run_during_reindex() {
    let repo = auth_repo();
    for i in 0..40 {
        write(repo.path(), &format!("pkg/module_{}.py", i), &format!("def handler_{}():\n    pass\n", i));
    }
    let lens = lens();
    lens.scan_blocking(repo.path()).unwrap();

    for i in 0..40 {
        write(repo.path(), &format!("pkg/module_{}.py", i), &format!("def handler_{}():\n    return {}\n", i, i));
    }

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let lens = lens.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut queries = 0;
                while !done.load(Ordering::SeqCst) || queries == 0 {
                    let ranked = lens.query("login").unwrap();
                    assert_eq!(ranked[0].path, "auth/login.py");
                    let index = lens.index();
                    assert!(index.read().check_consistency().is_ok());
                    queries += 1;
                }
                queries
            })
        })
        .collect();

    let report = lens.scan_blocking(repo.path()).unwrap();
    done.store(true, Ordering::SeqCst);
    assert_eq!(report.modified.len(), 40);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}

#[test]
fn test_snapshot_makes_restarts_incremental() {
    let repo = auth_repo();
    let cache = TempDir::new().unwrap();
    let build = || {
        RepoLens::builder()
            .workers(2)
            .cache_dir(cache.path())
            .build()
            .unwrap()
    };

    let first = build();
    tokio_test::block_on(first.scan(repo.path())).unwrap();
    let saved = store_of(&first);

    write(repo.path(), "auth/session.py", "def session():\n    return None\n");

    let second = build();
    let report = tokio_test::block_on(second.scan(repo.path())).unwrap();
    assert_eq!(report.modified, vec!["auth/session.py"]);
    assert_eq!(report.unchanged, 2);
    assert!(report.generation > saved.generation());

    // The save after the second pass is what a third process sees
    let third = build();
    assert!(third.load_snapshot(repo.path()).unwrap());
    assert_eq!(store_of(&third), store_of(&second));
}

#[test]
fn test_corrupt_snapshot_is_fatal() {
    let repo = auth_repo();
    let cache = TempDir::new().unwrap();
    let build = || RepoLens::builder().cache_dir(cache.path()).build().unwrap();

    let first = build();
    first.scan_blocking(repo.path()).unwrap();
    let snapshot = first.snapshot_path().unwrap();
    fs::write(&snapshot, b"not a gzip stream").unwrap();

    let second = build();
    let result = second.scan_blocking(repo.path());
    assert!(matches!(result, Err(RepoLensError::SnapshotCorrupt(_))));
    assert!(result.unwrap_err().is_fatal());
}
