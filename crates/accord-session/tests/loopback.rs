//! End-to-end session runs over loopback TCP: a real coordinator thread,
//! real participant clients, real trees on disk.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use accord_diff::{diff, NoCheck, SyntaxCheck};
use accord_merge::NoResolver;
use accord_session::{ClientEvent, Coordinator, CoordinatorConfig, ParticipantClient, SessionOutcome};
use accord_store::{BackupStore, DirBackupStore};
use accord_types::{FileChange, ParticipantId, Patch, SnapshotId};

const BASE_CONTENT: &str = "a\nb\nc\n";

fn pid(name: &str) -> ParticipantId {
    ParticipantId::new(name).unwrap()
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn read(dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(dir.join(rel)).unwrap()
}

fn test_config(tree_root: &Path, backup_root: &Path) -> CoordinatorConfig {
    CoordinatorConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        tree_root: tree_root.to_path_buf(),
        backup_root: backup_root.to_path_buf(),
        cache_path: None,
        poll_timeout_ms: 5,
        snapshot_fetch_timeout_secs: 30,
    }
}

/// Pump both clients until each produced a terminal session event.
fn pump_until_done(clients: &mut [&mut ParticipantClient]) -> Vec<Vec<ClientEvent>> {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut collected: Vec<Vec<ClientEvent>> = clients.iter().map(|_| Vec::new()).collect();

    while Instant::now() < deadline {
        for (i, client) in clients.iter_mut().enumerate() {
            collected[i].extend(client.update().unwrap());
        }
        let all_done = collected.iter().all(|events| {
            events.iter().any(|e| {
                matches!(
                    e,
                    ClientEvent::SessionStarted
                        | ClientEvent::SyncFailed { .. }
                        | ClientEvent::MergeFailed { .. }
                )
            })
        });
        if all_done {
            return collected;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("clients never reached a terminal session event: {collected:?}");
}

struct RejectEverything;

impl SyntaxCheck for RejectEverything {
    fn name(&self) -> &str {
        "reject-everything"
    }

    fn check(&self, _path: &str, _content: &str) -> Result<(), String> {
        Err("rejected by test policy".into())
    }
}

fn line2_patch(base_id: SnapshotId) -> Patch {
    Patch::new(
        "m1",
        base_id,
        vec![FileChange::new("shared.txt", diff(BASE_CONTENT, "a\nB\nc\n"))],
    )
}

#[test]
fn two_participants_converge_and_start() {
    let coord_tree = tempfile::tempdir().unwrap();
    write(coord_tree.path(), "shared.txt", BASE_CONTENT);

    let store_dir = tempfile::tempdir().unwrap();
    let store = DirBackupStore::open(store_dir.path()).unwrap();
    let (_, base_id) = store.create_backup(coord_tree.path()).unwrap();

    let mut coordinator = Coordinator::new(
        test_config(coord_tree.path(), store_dir.path()),
        Box::new(store),
        Box::new(NoResolver),
        Box::new(NoCheck),
    )
    .unwrap();
    let addr = coordinator.local_addr().unwrap();

    let handle = thread::spawn(move || {
        coordinator
            .wait_for_participants(2, Some(Duration::from_secs(10)))
            .unwrap();
        coordinator.run_session().unwrap()
    });

    let p1_tree = tempfile::tempdir().unwrap();
    write(p1_tree.path(), "shared.txt", BASE_CONTENT);
    let p2_tree = tempfile::tempdir().unwrap();
    write(p2_tree.path(), "shared.txt", BASE_CONTENT);

    let mut p1 =
        ParticipantClient::connect(addr, pid("p1"), p1_tree.path(), None, Box::new(NoCheck))
            .unwrap();
    let mut p2 =
        ParticipantClient::connect(addr, pid("p2"), p2_tree.path(), None, Box::new(NoCheck))
            .unwrap();

    p1.select_patches(vec!["m1".into()]);
    p1.upload_patch(&line2_patch(base_id)).unwrap();
    p1.ready();
    p2.select_patches(vec![]);

    let events = pump_until_done(&mut [&mut p1, &mut p2]);

    let outcome = handle.join().unwrap();
    assert!(outcome.is_started(), "outcome: {outcome:?}");

    // Every tree converged on the merged content.
    assert_eq!(read(coord_tree.path(), "shared.txt"), "a\nB\nc\n");
    assert_eq!(read(p1_tree.path(), "shared.txt"), "a\nB\nc\n");
    assert_eq!(read(p2_tree.path(), "shared.txt"), "a\nB\nc\n");

    // No leftover .bak files after commit.
    assert!(!p1_tree.path().join("shared.txt.bak").exists());
    for client_events in &events {
        assert!(client_events.contains(&ClientEvent::SessionStarted));
    }
}

#[test]
fn failing_participant_aborts_and_rolls_back() {
    // Scenario: participant 2 cannot apply; the broadcast names only p2 and
    // every tree ends up unchanged.
    let coord_tree = tempfile::tempdir().unwrap();
    write(coord_tree.path(), "shared.txt", BASE_CONTENT);

    let store_dir = tempfile::tempdir().unwrap();
    let store = DirBackupStore::open(store_dir.path()).unwrap();
    let (_, base_id) = store.create_backup(coord_tree.path()).unwrap();

    let mut coordinator = Coordinator::new(
        test_config(coord_tree.path(), store_dir.path()),
        Box::new(store),
        Box::new(NoResolver),
        Box::new(NoCheck),
    )
    .unwrap();
    let addr = coordinator.local_addr().unwrap();

    let handle = thread::spawn(move || {
        coordinator
            .wait_for_participants(2, Some(Duration::from_secs(10)))
            .unwrap();
        coordinator.run_session().unwrap()
    });

    let p1_tree = tempfile::tempdir().unwrap();
    write(p1_tree.path(), "shared.txt", BASE_CONTENT);
    let p2_tree = tempfile::tempdir().unwrap();
    write(p2_tree.path(), "shared.txt", BASE_CONTENT);

    let mut p1 =
        ParticipantClient::connect(addr, pid("p1"), p1_tree.path(), None, Box::new(NoCheck))
            .unwrap();
    // p2 rejects everything at the syntax gate, so its apply fails.
    let mut p2 = ParticipantClient::connect(
        addr,
        pid("p2"),
        p2_tree.path(),
        None,
        Box::new(RejectEverything),
    )
    .unwrap();

    p1.select_patches(vec!["m1".into()]);
    p1.upload_patch(&line2_patch(base_id)).unwrap();
    p1.ready();
    p2.select_patches(vec![]);

    let events = pump_until_done(&mut [&mut p1, &mut p2]);

    let outcome = handle.join().unwrap();
    match outcome {
        SessionOutcome::Aborted { failed, .. } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, pid("p2"));
        }
        other => panic!("expected abort, got {other:?}"),
    }

    // p1 saw the failure broadcast naming only p2.
    let p1_failure = events[0]
        .iter()
        .find_map(|e| match e {
            ClientEvent::SyncFailed { failed, .. } => Some(failed.clone()),
            _ => None,
        })
        .expect("p1 should see the sync failure");
    assert_eq!(p1_failure, vec![pid("p2")]);

    // The coordinator restored its authoritative tree, and p1 rolled its
    // staged application back.
    assert_eq!(read(coord_tree.path(), "shared.txt"), BASE_CONTENT);
    assert_eq!(read(p1_tree.path(), "shared.txt"), BASE_CONTENT);
    assert_eq!(read(p2_tree.path(), "shared.txt"), BASE_CONTENT);
}

#[test]
fn coordinator_fetches_missing_base_snapshot() {
    // The coordinator's store lacks the base snapshot; p1 owns it and serves
    // the transfer, which is hash-verified on receipt.
    let coord_tree = tempfile::tempdir().unwrap();
    write(coord_tree.path(), "shared.txt", BASE_CONTENT);

    let coord_store_dir = tempfile::tempdir().unwrap();
    let coord_store = DirBackupStore::open(coord_store_dir.path()).unwrap();

    let p1_tree = tempfile::tempdir().unwrap();
    write(p1_tree.path(), "shared.txt", BASE_CONTENT);
    let p1_store_dir = tempfile::tempdir().unwrap();
    let p1_store = DirBackupStore::open(p1_store_dir.path()).unwrap();
    let (_, base_id) = p1_store.create_backup(p1_tree.path()).unwrap();

    let mut coordinator = Coordinator::new(
        test_config(coord_tree.path(), coord_store_dir.path()),
        Box::new(coord_store),
        Box::new(NoResolver),
        Box::new(NoCheck),
    )
    .unwrap();
    let addr = coordinator.local_addr().unwrap();

    let handle = thread::spawn(move || {
        coordinator
            .wait_for_participants(2, Some(Duration::from_secs(10)))
            .unwrap();
        coordinator.run_session().unwrap()
    });

    let p2_tree = tempfile::tempdir().unwrap();
    write(p2_tree.path(), "shared.txt", BASE_CONTENT);

    let mut p1 = ParticipantClient::connect(
        addr,
        pid("p1"),
        p1_tree.path(),
        Some(p1_store),
        Box::new(NoCheck),
    )
    .unwrap();
    let mut p2 =
        ParticipantClient::connect(addr, pid("p2"), p2_tree.path(), None, Box::new(NoCheck))
            .unwrap();

    p1.select_patches(vec!["m1".into()]);
    p1.upload_patch(&line2_patch(base_id)).unwrap();
    p1.ready();
    p2.select_patches(vec![]);

    pump_until_done(&mut [&mut p1, &mut p2]);

    let outcome = handle.join().unwrap();
    assert!(outcome.is_started(), "outcome: {outcome:?}");
    assert_eq!(read(coord_tree.path(), "shared.txt"), "a\nB\nc\n");
}
