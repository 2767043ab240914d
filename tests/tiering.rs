//! End-to-end tier movement: demote on close, promote on access, evict on
//! command. Sweeps are driven explicitly instead of waiting on the timer.

mod common;

use common::{read_only, Fixture};
use routefs::objmap::Level;
use routefs::Vfs as _;

#[tokio::test]
async fn cached_demote_keeps_hot_copy_and_adds_cold() {
    let fixture = Fixture::new().await;
    fixture.create_file("/a.txt", b"ten bytes!").await;

    assert_eq!(
        fixture.fs.objmap().get("/a.txt", Level::L1).expect("read L1"),
        Some(fixture.hot.clone())
    );

    fixture.open_cycle("/a.txt").await;
    fixture.fs.process_queue_once().await;

    assert!(fixture.hot_path("/a.txt").exists(), "cached demote keeps the hot copy");
    assert!(fixture.cold_path("/a.txt").exists(), "demote writes the cold copy");
    assert_eq!(
        std::fs::read(fixture.cold_path("/a.txt")).expect("read cold copy"),
        b"ten bytes!"
    );
    assert_eq!(
        fixture.fs.objmap().get("/a.txt", Level::L1).expect("read L1"),
        Some(fixture.hot.clone())
    );
    assert_eq!(
        fixture.fs.objmap().get("/a.txt", Level::L2).expect("read L2"),
        Some(fixture.cold.clone())
    );
    assert_eq!(fixture.fs.queue().get("/a.txt").expect("read queue"), None);
}

#[tokio::test]
async fn uncached_demote_moves_the_file() {
    let fixture = Fixture::with_cache_mode(false).await;
    fixture.create_file("/b.bin", b"payload").await;

    fixture.open_cycle("/b.bin").await;
    fixture.fs.process_queue_once().await;

    assert!(!fixture.hot_path("/b.bin").exists(), "uncached demote removes the source");
    assert!(fixture.cold_path("/b.bin").exists());
    assert_eq!(
        fixture.fs.objmap().get("/b.bin", Level::L1).expect("read L1"),
        Some(fixture.cold.clone())
    );
    assert_eq!(fixture.fs.resolve("/b.bin"), fixture.cold);
    assert_eq!(fixture.fs.queue().get("/b.bin").expect("read queue"), None);
}

#[tokio::test]
async fn evict_drops_idle_hot_copy_with_cold_twin() {
    let fixture = Fixture::new().await;
    fixture.create_file("/a.txt", b"ten bytes!").await;
    fixture.open_cycle("/a.txt").await;
    fixture.fs.process_queue_once().await;

    // Not evictable while the access record is fresh.
    fixture.fs.evict_once().await;
    assert!(fixture.hot_path("/a.txt").exists());

    fixture.fs.stats().delete("/a.txt").expect("clear stats");
    fixture.fs.evict_once().await;

    assert!(!fixture.hot_path("/a.txt").exists(), "idle hot copy is unlinked");
    assert!(fixture.cold_path("/a.txt").exists(), "cold copy is preserved");
    assert_eq!(fixture.fs.objmap().get("/a.txt", Level::L1).expect("read L1"), None);
    assert_eq!(
        fixture.fs.objmap().get("/a.txt", Level::L2).expect("read L2"),
        Some(fixture.cold.clone())
    );
}

#[tokio::test]
async fn open_of_cold_object_promotes_back_to_hot() {
    let fixture = Fixture::new().await;
    fixture.create_file("/a.txt", b"ten bytes!").await;
    fixture.open_cycle("/a.txt").await;
    fixture.fs.process_queue_once().await;
    fixture.fs.stats().delete("/a.txt").expect("clear stats");
    fixture.fs.evict_once().await;

    // The resolver lands on the cold copy now.
    assert_eq!(fixture.fs.resolve("/a.txt"), fixture.cold);
    let fh = fixture.fs.open("/a.txt", read_only()).await.expect("open cold object");
    let data = fixture.fs.read(fh, 0, 64).await.expect("read cold object");
    assert_eq!(data, b"ten bytes!");
    fixture.fs.release("/a.txt", fh).await.expect("release");

    fixture.fs.process_queue_once().await;

    assert!(fixture.hot_path("/a.txt").exists(), "promotion restores the hot copy");
    assert!(fixture.cold_path("/a.txt").exists(), "promotion never moves the cold copy");
    assert_eq!(
        fixture.fs.objmap().get("/a.txt", Level::L1).expect("read L1"),
        Some(fixture.hot.clone())
    );
    assert!(fixture.fs.stats().get("/a.txt").expect("read stats").is_some());
    assert_eq!(fixture.fs.queue().get("/a.txt").expect("read queue"), None);
    assert_eq!(fixture.fs.resolve("/a.txt"), fixture.hot);
}

#[tokio::test]
async fn queue_entry_for_missing_placement_is_dropped() {
    let fixture = Fixture::new().await;
    fixture.create_file("/fresh.txt", b"x").await;

    // A plain open queues a promote-shaped entry anchored at the cold
    // tier, where nothing exists yet.
    let fh = fixture.fs.open("/fresh.txt", read_only()).await.expect("open");
    assert!(fixture.fs.queue().get("/fresh.txt").expect("read queue").is_some());
    fixture.fs.process_queue_once().await;
    assert_eq!(fixture.fs.queue().get("/fresh.txt").expect("read queue"), None);
    fixture.fs.release("/fresh.txt", fh).await.expect("release");
}
