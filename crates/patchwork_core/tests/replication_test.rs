//! Integration tests for replicas syncing over an in-process link and for
//! projects persisted on disk

use std::sync::{Arc, Mutex};

use patchwork_core::events::ProjectEvent;
use patchwork_core::project::{FileContent, Project};
use patchwork_core::store::{FsStorage, LinkControl, MemoryStorage, MemoryTransport};
use patchwork_core::fs::RealFileSystem;
use patchwork_core::{PatchworkError, ProjectConfig};

/// A project and a second replica joining it over a memory link.
fn replica_pair() -> (Project, Project, LinkControl) {
    let (ta, tb) = MemoryTransport::pair();
    let control = ta.control();

    let a = Project::open_with(
        ProjectConfig::default(),
        Arc::new(MemoryStorage::new()),
        Some(Box::new(ta)),
    )
    .unwrap();
    let b = Project::open_with(
        ProjectConfig::default().joining(a.get_doc_id()),
        Arc::new(MemoryStorage::new()),
        Some(Box::new(tb)),
    )
    .unwrap();
    (a, b, control)
}

fn pump(a: &Project, b: &Project) {
    for _ in 0..20 {
        a.process();
        b.process();
    }
}

fn record(project: &Project) -> Arc<Mutex<Vec<ProjectEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    project.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

#[test]
fn test_joining_replica_becomes_ready() {
    let (a, b, _control) = replica_pair();
    a.save_file("readme.md", "# Game").unwrap();

    assert!(!b.is_ready());
    assert!(matches!(b.list_all_files(), Err(PatchworkError::NotReady)));
    assert!(b.get_checked_out_branch_id().is_none());

    let seen = record(&b);
    pump(&a, &b);

    assert!(b.is_ready());
    assert_eq!(b.get_doc_id(), a.get_doc_id());
    assert_eq!(b.get_checked_out_branch_id(), a.get_checked_out_branch_id());
    assert_eq!(b.get_file("readme.md").unwrap(), FileContent::text("# Game"));
    assert_eq!(seen.lock().unwrap().first(), Some(&ProjectEvent::Started));
}

#[test]
fn test_remote_writes_notify_listeners() {
    let (a, b, _control) = replica_pair();
    pump(&a, &b);

    let seen = record(&b);
    a.save_file("scenes/main.tscn", "[gd_scene]").unwrap();
    pump(&a, &b);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ProjectEvent::file_changed("scenes/main.tscn"),
            ProjectEvent::FilesChanged
        ]
    );
}

#[test]
fn test_branches_replicate() {
    let (a, b, _control) = replica_pair();
    pump(&a, &b);

    let seen = record(&a);
    let feature = b.create_branch("feature").unwrap();
    b.checkout_branch(&feature).unwrap();
    b.save_file("feature.txt", "from b").unwrap();
    pump(&a, &b);

    assert!(a.get_branches().iter().any(|branch| branch.id == feature));
    assert!(matches!(
        seen.lock().unwrap().as_slice(),
        [ProjectEvent::BranchesChanged { .. }]
    ));

    a.merge_branch("feature").unwrap();
    assert_eq!(a.get_file("feature.txt").unwrap(), FileContent::text("from b"));
}

#[test]
fn test_concurrent_edits_converge() {
    let (a, b, _control) = replica_pair();
    a.save_file("notes.txt", "alpha\nbeta\ngamma\n").unwrap();
    pump(&a, &b);

    a.save_file("notes.txt", "ALPHA\nbeta\ngamma\n").unwrap();
    b.save_file("notes.txt", "alpha\nbeta\nGAMMA\n").unwrap();
    pump(&a, &b);

    let expected = FileContent::text("ALPHA\nbeta\nGAMMA\n");
    assert_eq!(a.get_file("notes.txt").unwrap(), expected);
    assert_eq!(b.get_file("notes.txt").unwrap(), expected);
    assert_eq!(a.get_heads().unwrap(), b.get_heads().unwrap());
}

#[test]
fn test_concurrent_binary_writes_pick_one_blob() {
    let (a, b, _control) = replica_pair();
    pump(&a, &b);

    a.save_file("icon.png", vec![1_u8, 1, 1]).unwrap();
    b.save_file("icon.png", vec![2_u8, 2]).unwrap();
    pump(&a, &b);

    let on_a = a.get_file("icon.png").unwrap();
    assert_eq!(on_a, b.get_file("icon.png").unwrap());
    assert!(on_a.is_binary());
    assert!(on_a == FileContent::binary(vec![1, 1, 1]) || on_a == FileContent::binary(vec![2, 2]));
}

#[test]
fn test_partition_degrades_to_local_and_recovers() {
    let (a, b, control) = replica_pair();
    pump(&a, &b);

    control.partition();
    a.save_file("offline.txt", "written offline").unwrap();
    pump(&a, &b);
    assert!(!b.file_exists("offline.txt").unwrap());
    assert!(!a.is_connected());

    control.heal();
    pump(&a, &b);
    assert_eq!(
        b.get_file("offline.txt").unwrap(),
        FileContent::text("written offline")
    );
}

#[test]
fn test_project_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = ProjectConfig::with_storage_dir(dir.path().join("docs"));

    let (doc_id, feature) = {
        let project = Project::open(config.clone()).unwrap();
        project.save_file("main.txt", "on main").unwrap();
        project.set_state_int("player", "level", 4).unwrap();
        let feature = project.create_branch("feature").unwrap();
        project.checkout_branch(&feature).unwrap();
        project.save_file("feature.txt", "on feature").unwrap();
        (project.get_doc_id(), feature)
    };

    // Reopen on main
    let reopened = Project::open(config.clone().joining(doc_id.clone())).unwrap();
    assert!(reopened.is_ready());
    assert_eq!(reopened.get_doc_id(), doc_id);
    assert_eq!(reopened.get_branches().len(), 2);
    assert_eq!(reopened.list_all_files().unwrap(), vec!["main.txt"]);
    assert_eq!(reopened.get_state_int("player", "level").unwrap(), Some(4));
    drop(reopened);

    // Reopen on the remembered branch
    let mut on_feature = config.joining(doc_id);
    on_feature.checked_out_branch = Some(feature.clone());
    let reopened = Project::open(on_feature).unwrap();
    assert_eq!(reopened.get_checked_out_branch_id(), Some(feature));
    assert_eq!(
        reopened.list_all_files().unwrap(),
        vec!["feature.txt", "main.txt"]
    );
}

#[test]
fn test_fs_storage_holds_one_snapshot_per_document() {
    use patchwork_core::store::DocStorage;

    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FsStorage::open(RealFileSystem, dir.path()).unwrap());
    let project = Project::open_with(ProjectConfig::default(), storage.clone(), None).unwrap();
    project.create_branch("feature").unwrap();
    project.flush().unwrap();

    // Metadata, main and feature
    assert_eq!(storage.list_docs().unwrap().len(), 3);
    assert!(storage.list_docs().unwrap().contains(&project.get_doc_id()));
}

#[test]
fn test_join_without_peers_stays_not_ready() {
    let project = Project::open(
        ProjectConfig::default().joining("6f9619ff8b86d011b42d00cf4fc964ff"),
    )
    .unwrap();
    for _ in 0..3 {
        project.process();
    }
    assert!(!project.is_ready());
    assert!(matches!(
        project.save_file("a.txt", "x"),
        Err(PatchworkError::NotReady)
    ));
    assert_eq!(project.get_doc_id(), "6f9619ff8b86d011b42d00cf4fc964ff");
}

#[test]
fn test_invalid_doc_id_is_rejected() {
    let err = Project::open(ProjectConfig::default().joining("not a doc id"))
        .err()
        .unwrap();
    assert!(matches!(err, PatchworkError::InvalidDocumentId(_)));
}
