//! Store tiers, multi-store directory fanout, and the block-copy migration
//! engine that moves objects between tier roots.

use std::io::{Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

use tokio::task;
use tracing::debug;

use crate::config::Config;
use crate::error::{map_io_error, FsError, FsResult};
use crate::paths;

/// Migration copy block. The buffer stays page-aligned so direct I/O can be
/// switched on without a contract change.
pub const DIRECTIO_BLOCK_SIZE: usize = 256 * 1024;

/// One backing location.
#[derive(Debug, Clone)]
pub struct StoreTier {
    pub root: String,
    pub is_cached: bool,
}

/// The registered stores: the two managed tiers plus any extra volumes.
#[derive(Debug, Clone)]
pub struct StoreSet {
    source: StoreTier,
    target: StoreTier,
    volumes: Vec<String>,
}

impl StoreSet {
    /// Tier roots come from resolved configuration; nothing binds before
    /// the roots are known.
    pub fn new(config: &Config) -> Self {
        let source = StoreTier { root: config.data_root.clone(), is_cached: config.cache_mode };
        let target = StoreTier { root: config.archive_root.clone(), is_cached: false };
        Self { source, target, volumes: config.volumes() }
    }

    /// The hot/staging tier.
    pub fn source(&self) -> &StoreTier {
        &self.source
    }

    /// The cold/archival tier.
    pub fn target(&self) -> &StoreTier {
        &self.target
    }

    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    pub fn is_valid_store(&self, store: &str) -> bool {
        self.volumes.iter().any(|volume| volume == store)
    }

    /// Create `path` in every registered store whose parent directory
    /// exists, excluding `skip` (the caller handles its own root). The
    /// first failure aborts; directories already created stay in place.
    pub async fn mkdir_all(&self, path: &str, mode: u32, skip: &str) -> FsResult<()> {
        for volume in &self.volumes {
            if volume == skip {
                continue;
            }
            let parent = paths::join(volume, paths::parent(path));
            if tokio::fs::symlink_metadata(&parent).await.is_err() {
                debug!(%volume, path, "store parent missing, skipping mkdir");
                continue;
            }
            create_dir_mode(paths::join(volume, path), mode).await?;
        }
        Ok(())
    }

    /// Rename `path` in every registered store that exists, excluding
    /// `skip`. The first failure aborts; earlier renames stay in place.
    pub async fn rename_all(&self, path: &str, new_path: &str, skip: &str) -> FsResult<()> {
        for volume in &self.volumes {
            if volume == skip {
                continue;
            }
            if tokio::fs::symlink_metadata(volume).await.is_err() {
                debug!(%volume, "store not present, skipping rename");
                continue;
            }
            let from = paths::join(volume, path);
            let to = paths::join(volume, new_path);
            tokio::fs::rename(&from, &to).await.map_err(map_io_error)?;
        }
        Ok(())
    }

    /// Remove the directory `path` from every registered store that exists,
    /// excluding `skip`.
    pub async fn rmdir_all(&self, path: &str, skip: &str) -> FsResult<()> {
        for volume in &self.volumes {
            if volume == skip {
                continue;
            }
            if tokio::fs::symlink_metadata(volume).await.is_err() {
                debug!(%volume, "store not present, skipping rmdir");
                continue;
            }
            tokio::fs::remove_dir(paths::join(volume, path)).await.map_err(map_io_error)?;
        }
        Ok(())
    }
}

pub(crate) async fn create_dir_mode(path: String, mode: u32) -> FsResult<()> {
    task::spawn_blocking(move || {
        let mut builder = std::fs::DirBuilder::new();
        builder.mode(mode);
        builder.create(&path)
    })
    .await
    .map_err(|_| FsError::Io)?
    .map_err(map_io_error)
}

/// Copy one file from `from_store` to `to_store` in aligned blocks, then
/// unlink the source unless `keep_source`.
///
/// A short count at any step other than the final partial block is fatal;
/// a partial target is left as-is for the next attempt to overwrite.
pub async fn migrate(
    path: &str,
    from_store: &str,
    to_store: &str,
    keep_source: bool,
) -> FsResult<()> {
    let from = paths::join(from_store, path);
    let to = paths::join(to_store, path);
    debug!(path, from_store, to_store, keep_source, "migrating");
    task::spawn_blocking(move || migrate_blocking(&from, &to, keep_source))
        .await
        .map_err(|_| FsError::Io)?
        .map_err(map_io_error)
}

fn migrate_blocking(from: &str, to: &str, keep_source: bool) -> std::io::Result<()> {
    let mut src = std::fs::File::open(from)?;
    let size = std::fs::symlink_metadata(from)?.len() as usize;
    let mut dst =
        std::fs::OpenOptions::new().write(true).create(true).mode(0o600).open(to)?;

    let mut block = AlignedBlock::new();
    let buf = block.as_mut_slice();
    let mut bytes_left = size;
    while bytes_left >= DIRECTIO_BLOCK_SIZE {
        src.read_exact(buf)?;
        dst.write_all(buf)?;
        bytes_left -= DIRECTIO_BLOCK_SIZE;
    }
    if bytes_left > 0 {
        src.read_exact(&mut buf[..bytes_left])?;
        dst.write_all(&buf[..bytes_left])?;
    }
    drop(dst);
    drop(src);

    if !keep_source {
        std::fs::remove_file(from)?;
    }
    Ok(())
}

/// One page-aligned copy buffer, allocated per migration.
struct AlignedBlock {
    raw: Vec<u8>,
    offset: usize,
}

impl AlignedBlock {
    fn new() -> Self {
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.max(1) as usize;
        let raw = vec![0u8; DIRECTIO_BLOCK_SIZE + page];
        let offset = raw.as_ptr().align_offset(page);
        Self { raw, offset }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.raw[self.offset..self.offset + DIRECTIO_BLOCK_SIZE]
    }
}
