//! Post-process queue semantics: insert-if-absent, the persisted monotonic
//! counter and the obj-id guarded delete.

use routefs::postprocess::{PpQueue, CTL_PATH};
use tempfile::TempDir;

fn open_queue(dir: &TempDir) -> PpQueue {
    PpQueue::open(dir.path()).expect("open queue")
}

#[test]
fn set_is_insert_if_absent() {
    let dir = TempDir::new().expect("create temp dir");
    let queue = open_queue(&dir);

    queue.set("/d", 0, &["/stores/x"]).expect("first set");
    let first = queue.get("/d").expect("get").expect("entry present");

    queue.set("/d", 0, &["/stores/y"]).expect("second set");
    let second = queue.get("/d").expect("get").expect("entry present");

    assert_eq!(second.obj_id, first.obj_id, "a queued path keeps its obj-id");
    assert_eq!(second.store_paths, vec!["/stores/x".to_owned()]);
    assert_eq!(queue.current_obj_id(), first.obj_id, "no counter bump for a no-op set");
}

#[test]
fn delete_with_stale_obj_id_is_suppressed() {
    let dir = TempDir::new().expect("create temp dir");
    let queue = open_queue(&dir);

    queue.set("/d", 0, &["/stores/x"]).expect("set");
    let old = queue.get("/d").expect("get").expect("entry present");

    queue.delete("/d", &old).expect("matching delete");
    assert_eq!(queue.get("/d").expect("get"), None);

    queue.set("/d", 0, &["/stores/y"]).expect("requeue");
    queue.delete("/d", &old).expect("stale delete");

    let survivor = queue.get("/d").expect("get").expect("requeued entry survives");
    assert_ne!(survivor.obj_id, old.obj_id);
    assert_eq!(survivor.store_paths, vec!["/stores/y".to_owned()]);
}

#[test]
fn counter_is_monotonic_and_survives_reopen() {
    let dir = TempDir::new().expect("create temp dir");
    {
        let queue = open_queue(&dir);
        queue.set("/a", 0, &["/stores/x"]).expect("set");
        queue.set("/b", 0, &["/stores/x", "/stores/y"]).expect("set");
        assert_eq!(queue.current_obj_id(), 2);
        for (_, entry) in queue.snapshot().expect("snapshot") {
            assert!(entry.obj_id <= queue.current_obj_id());
        }
    }

    let queue = open_queue(&dir);
    assert_eq!(queue.current_obj_id(), 2, "counter reloads from the reserved key");
    queue.set("/c", 0, &["/stores/x"]).expect("set");
    assert_eq!(queue.get("/c").expect("get").expect("entry").obj_id, 3);
}

#[test]
fn control_file_is_never_queued() {
    let dir = TempDir::new().expect("create temp dir");
    let queue = open_queue(&dir);

    queue.set(CTL_PATH, 0, &["/stores/x"]).expect("set is a no-op");
    assert_eq!(queue.get(CTL_PATH).expect("get"), None);
    assert!(queue.snapshot().expect("snapshot").is_empty());
}

#[test]
fn reserved_counter_key_is_not_an_entry() {
    let dir = TempDir::new().expect("create temp dir");
    let queue = open_queue(&dir);

    queue.set("/a", 0, &["/stores/x"]).expect("set");
    let paths: Vec<String> =
        queue.snapshot().expect("snapshot").into_iter().map(|(path, _)| path).collect();
    assert_eq!(paths, vec!["/a".to_owned()]);

    let entry = queue.get("/a").expect("get").expect("entry");
    queue.delete("__obj_gid__", &entry).expect("reserved delete is a no-op");
    assert_eq!(queue.current_obj_id(), 1);
}

#[test]
fn list_returns_direct_children_only() {
    let dir = TempDir::new().expect("create temp dir");
    let queue = open_queue(&dir);

    queue.set("/a", 0, &["/stores/x"]).expect("set");
    queue.set("/d/x", 0, &["/stores/x"]).expect("set");
    queue.set("/d/e/f", 0, &["/stores/x"]).expect("set");

    let mut root = queue.list("/").expect("list root");
    root.sort();
    assert_eq!(root, vec!["a".to_owned()]);
    assert_eq!(queue.list("/d").expect("list /d"), vec!["x".to_owned()]);
}

#[test]
fn oversized_store_sequences_are_rejected() {
    let dir = TempDir::new().expect("create temp dir");
    let queue = open_queue(&dir);

    let stores = ["/1", "/2", "/3", "/4", "/5", "/6"];
    assert!(queue.set("/a", 0, &stores).is_err());
    assert_eq!(queue.get("/a").expect("get"), None);
}
