//! Block-copy migration engine behavior, including the empty-file and
//! block-boundary edges.

use routefs::store::{migrate, DIRECTIO_BLOCK_SIZE};
use tempfile::TempDir;

struct Stores {
    _tempdir: TempDir,
    from: String,
    to: String,
}

fn stores() -> Stores {
    let tempdir = TempDir::new().expect("create temp dir");
    let from = tempdir.path().join("from").to_string_lossy().into_owned();
    let to = tempdir.path().join("to").to_string_lossy().into_owned();
    std::fs::create_dir(&from).expect("create source store");
    std::fs::create_dir(&to).expect("create target store");
    Stores { _tempdir: tempdir, from, to }
}

fn seed(stores: &Stores, path: &str, data: &[u8]) {
    std::fs::write(format!("{}{}", stores.from, path), data).expect("seed source file");
}

#[tokio::test]
async fn move_copies_content_and_unlinks_source() {
    let stores = stores();
    seed(&stores, "/a.txt", b"hello tiering");

    migrate("/a.txt", &stores.from, &stores.to, false).await.expect("migrate");

    assert_eq!(
        std::fs::read(format!("{}/a.txt", stores.to)).expect("read target"),
        b"hello tiering"
    );
    assert!(!std::path::Path::new(&format!("{}/a.txt", stores.from)).exists());
}

#[tokio::test]
async fn keep_source_leaves_both_copies() {
    let stores = stores();
    seed(&stores, "/a.txt", b"cached");

    migrate("/a.txt", &stores.from, &stores.to, true).await.expect("migrate");

    assert!(std::path::Path::new(&format!("{}/a.txt", stores.from)).exists());
    assert_eq!(std::fs::read(format!("{}/a.txt", stores.to)).expect("read target"), b"cached");
}

#[tokio::test]
async fn empty_file_produces_empty_target() {
    let stores = stores();
    seed(&stores, "/empty", b"");

    migrate("/empty", &stores.from, &stores.to, false).await.expect("migrate");

    let target = std::fs::metadata(format!("{}/empty", stores.to)).expect("stat target");
    assert_eq!(target.len(), 0);
    assert!(!std::path::Path::new(&format!("{}/empty", stores.from)).exists());
}

#[tokio::test]
async fn files_larger_than_one_block_survive_intact() {
    let stores = stores();
    let data: Vec<u8> =
        (0..DIRECTIO_BLOCK_SIZE + 4097).map(|index| (index % 251) as u8).collect();
    seed(&stores, "/big.bin", &data);

    migrate("/big.bin", &stores.from, &stores.to, true).await.expect("migrate");

    assert_eq!(std::fs::read(format!("{}/big.bin", stores.to)).expect("read target"), data);
}

#[tokio::test]
async fn missing_source_fails() {
    let stores = stores();
    assert!(migrate("/absent", &stores.from, &stores.to, false).await.is_err());
}
