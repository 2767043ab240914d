use std::path::PathBuf;

use routefs::vfs::OpenFlags;
use routefs::{Config, RouteFs, Vfs as _};
use tempfile::TempDir;

/// A mounted-core fixture: meta root plus hot and cold tier directories
/// under one temp dir, with the filesystem initialized.
///
/// The filesystem comes before the temp dir so its indexes close before
/// the directory disappears.
pub struct Fixture {
    pub fs: RouteFs,
    pub hot: String,
    pub cold: String,
    pub tempdir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_options(true, None).await
    }

    pub async fn with_cache_mode(cache_mode: bool) -> Self {
        Self::with_options(cache_mode, None).await
    }

    pub async fn with_options(cache_mode: bool, type_map: Option<&str>) -> Self {
        let tempdir = TempDir::new().expect("create temp dir");
        let meta = tempdir.path().join("meta");
        std::fs::create_dir(&meta).expect("create meta root");
        if let Some(records) = type_map {
            std::fs::write(meta.join(".type.map"), records).expect("write type map");
        }

        let mut config = Config::new(&meta);
        config.cache_mode = cache_mode;
        let hot = config.data_root.clone();
        let cold = config.archive_root.clone();
        std::fs::create_dir(&hot).expect("create data root");
        std::fs::create_dir(&cold).expect("create archive root");

        let fs = RouteFs::new(config).expect("open filesystem");
        fs.init().await.expect("init filesystem");
        Self { fs, hot, cold, tempdir }
    }

    pub fn hot_path(&self, path: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.hot, path))
    }

    pub fn cold_path(&self, path: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.cold, path))
    }

    /// Create a file through the vtable, write `data` and close it.
    pub async fn create_file(&self, path: &str, data: &[u8]) {
        let fh = self.fs.create(path, 0o644).await.expect("create file");
        if !data.is_empty() {
            let written = self.fs.write(fh, 0, data).await.expect("write file");
            assert_eq!(written as usize, data.len());
        }
        self.fs.release(path, fh).await.expect("release created file");
    }

    /// A plain open/release cycle with a queue sweep while the file is
    /// open, the timing under which a release queues placement work.
    pub async fn open_cycle(&self, path: &str) {
        let fh = self.fs.open(path, read_only()).await.expect("open file");
        self.fs.process_queue_once().await;
        self.fs.release(path, fh).await.expect("release file");
    }
}

pub fn read_only() -> OpenFlags {
    // O_RDONLY is zero.
    OpenFlags(0)
}
