//! The routing filesystem itself: placement resolution plus the operation
//! vtable over real file I/O and the persistent indexes.

mod handles;

use std::collections::HashSet;
use std::ffi::CString;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::control::ControlCommand;
use crate::error::{map_io_error, FsError, FsResult};
use crate::objmap::{Level, ObjMap};
use crate::paths;
use crate::postprocess::PpQueue;
use crate::ppd::Ppd;
use crate::rootmap::TypeMap;
use crate::stats::StatsDb;
use crate::store::{self, StoreSet};
use crate::vfs::{DirFiller, FileAttr, FileTime, Fh, OpenFlags, StatFs, Vfs};

use handles::HandleTable;

/// Tier-routing passthrough filesystem.
///
/// One value owns the whole runtime: store tiers, type routes, the four
/// persistent indexes, the open-handle table and the background
/// post-processor. The kernel bridge keeps it in its opaque user-data slot
/// and drives it through the [`Vfs`] vtable.
pub struct RouteFs {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) stores: StoreSet,
    pub(crate) objmap: ObjMap,
    pub(crate) stats: StatsDb,
    pub(crate) queue: PpQueue,
    rootdir: RwLock<String>,
    rootmap: RwLock<TypeMap>,
    xattrs: DashMap<String, Vec<u8>>,
    handles: HandleTable,
    ppd: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Placement decision: L1, then L2 in cache mode, then the type route.
    /// Exactly one store root comes back for any path.
    pub(crate) fn resolve(&self, path: &str) -> String {
        match self.objmap.get(path, Level::L1) {
            Ok(Some(store)) => return store,
            Ok(None) => {}
            Err(err) => debug!(path, %err, "L1 lookup failed, falling through"),
        }
        if self.config.cache_mode {
            match self.objmap.get(path, Level::L2) {
                Ok(Some(store)) => return store,
                Ok(None) => {}
                Err(err) => debug!(path, %err, "L2 lookup failed, falling through"),
            }
        }
        read_lock(&self.rootmap).route(path).to_owned()
    }

    /// Physical path of the object: resolved store root plus logical path.
    pub(crate) fn full_path(&self, path: &str) -> String {
        paths::join(&self.resolve(path), path)
    }

    /// Physical path under the current root dir (directory namespace).
    pub(crate) fn root_path(&self, path: &str) -> String {
        paths::join(&read_lock(&self.rootdir), path)
    }

    fn rootdir(&self) -> String {
        read_lock(&self.rootdir).clone()
    }

    /// Register the store portion of `dest` as `path`'s L1 placement.
    /// `dest` must carry `path` as its suffix; anything else is ignored.
    fn set_objmap(&self, path: &str, dest: &str) -> FsResult<()> {
        match dest.strip_suffix(path) {
            Some(store) => self.objmap.set(path, store, Level::L1),
            None => {
                debug!(path, dest, "destination does not end with path, skipping objmap");
                Ok(())
            }
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    /// Append object-map children of `path` that the root dir listing did
    /// not already produce.
    fn store_readdir(
        &self,
        path: &str,
        filler: &mut dyn DirFiller,
        seen: &mut HashSet<String>,
    ) -> FsResult<()> {
        for level in [Level::L1, Level::L2] {
            for name in self.objmap.list(path, level)? {
                if seen.insert(name.clone()) && !filler.push(&name) {
                    warn!(path, "readdir filler refused entry, buffer full");
                    return Err(FsError::Full);
                }
            }
        }
        Ok(())
    }
}

impl RouteFs {
    /// Open every index and build the runtime. The type map starts with
    /// the default rule only; `init` loads the full table.
    pub fn new(config: Config) -> FsResult<Self> {
        let stores = StoreSet::new(&config);
        let objmap = ObjMap::open(&config.meta_root, config.cache_mode)?;
        let stats = StatsDb::open(&config.meta_root)?;
        let queue = PpQueue::open(&config.meta_root)?;
        let rootmap = TypeMap::with_default(&config.data_root);
        let rootdir = config.meta_root.to_string_lossy().into_owned();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                stores,
                objmap,
                stats,
                queue,
                rootdir: RwLock::new(rootdir),
                rootmap: RwLock::new(rootmap),
                xattrs: DashMap::new(),
                handles: HandleTable::default(),
                ppd: Mutex::new(None),
            }),
        })
    }

    /// One post-processor sweep, the same work a timer tick performs.
    pub async fn process_queue_once(&self) {
        Ppd::new(self.shared.clone()).sweep().await;
    }

    /// One L1 eviction pass, the same work the EVICT command performs.
    pub async fn evict_once(&self) {
        Ppd::new(self.shared.clone()).evict().await;
    }

    /// The store root currently backing `path`.
    pub fn resolve(&self, path: &str) -> String {
        self.shared.resolve(path)
    }

    pub fn objmap(&self) -> &ObjMap {
        &self.shared.objmap
    }

    pub fn stats(&self) -> &StatsDb {
        &self.shared.stats
    }

    pub fn queue(&self) -> &PpQueue {
        &self.shared.queue
    }
}

#[async_trait]
impl Vfs for RouteFs {
    async fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        let full = self.shared.full_path(path);
        // Existence probe on a hot path; the error goes back unlogged.
        let meta = fs::symlink_metadata(&full).await.map_err(map_io_error)?;
        Ok(FileAttr::from_metadata(&meta))
    }

    async fn read_link(&self, path: &str) -> FsResult<String> {
        let full = self.shared.full_path(path);
        let target = fs::read_link(&full).await.map_err(map_io_error)?;
        Ok(target.to_string_lossy().into_owned())
    }

    async fn make_node(&self, path: &str, mode: u32, dev: u64) -> FsResult<()> {
        let full = self.shared.full_path(path);
        debug!(path, %full, mode, "mknod");
        self.shared.set_objmap(path, &full)?;
        run_blocking(move || make_node_blocking(&full, mode, dev)).await
    }

    async fn make_dir(&self, path: &str, mode: u32) -> FsResult<()> {
        debug!(path, mode, "mkdir");
        let rootdir = self.shared.rootdir();
        self.shared.stores.mkdir_all(path, mode, &rootdir).await?;
        store::create_dir_mode(self.shared.root_path(path), mode).await
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let full = self.shared.full_path(path);
        debug!(path, %full, "unlink");
        let first = fs::remove_file(&full).await;
        if let Err(err) = &first {
            warn!(path, %err, "unlink: no copy at primary placement");
        }
        self.shared.objmap.delete(path, Level::L1)?;
        self.shared.stats.delete(path)?;

        if !self.shared.config.cache_mode {
            return first.map_err(map_io_error);
        }

        // A cached object may have a second copy; with the L1 entry gone
        // the resolver now lands on it.
        let full = self.shared.full_path(path);
        let second = fs::remove_file(&full).await;
        if let Err(err) = &second {
            warn!(path, %err, "unlink: no copy at secondary placement");
        }
        self.shared.objmap.delete(path, Level::L2)?;

        if second.is_ok() {
            return Ok(());
        }
        first.map_err(map_io_error)
    }

    async fn remove_dir(&self, path: &str) -> FsResult<()> {
        debug!(path, "rmdir");
        let rootdir = self.shared.rootdir();
        self.shared.stores.rmdir_all(path, &rootdir).await?;
        fs::remove_dir(self.shared.root_path(path)).await.map_err(map_io_error)
    }

    async fn make_symlink(&self, target: &str, link: &str) -> FsResult<()> {
        let full_link = self.shared.full_path(link);
        debug!(target, link, %full_link, "symlink");
        self.shared.set_objmap(link, &full_link)?;
        fs::symlink(target, &full_link).await.map_err(map_io_error)
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let root_from = self.shared.root_path(from);
        let is_dir = matches!(
            fs::symlink_metadata(&root_from).await,
            Ok(meta) if meta.is_dir()
        );

        if is_dir {
            debug!(from, to, "rename directory across stores");
            let rootdir = self.shared.rootdir();
            // Every store path moves before the root namespace does.
            self.shared.stores.rename_all(from, to, &rootdir).await?;
            let root_to = self.shared.root_path(to);
            return fs::rename(&root_from, &root_to).await.map_err(map_io_error);
        }

        let full_from = self.shared.full_path(from);
        let full_to = self.shared.full_path(to);
        debug!(from, to, %full_from, %full_to, "rename object");
        fs::rename(&full_from, &full_to).await.map_err(map_io_error)?;

        // The store root survives a rename; only the logical key changes.
        let Some(store) = self.shared.objmap.get(from, Level::L1)? else {
            warn!(from, "renamed object has no map entry");
            return Err(FsError::NotFound);
        };
        self.shared.objmap.set(to, &store, Level::L1)?;
        self.shared.objmap.delete(from, Level::L1)?;
        if self.shared.config.cache_mode {
            self.shared.objmap.delete(from, Level::L2)?;
        }
        Ok(())
    }

    async fn link(&self, path: &str, new_path: &str) -> FsResult<()> {
        let full = self.shared.full_path(path);
        let full_new = self.shared.full_path(new_path);
        debug!(path, new_path, "link");
        fs::hard_link(&full, &full_new).await.map_err(map_io_error)
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        use std::os::unix::fs::PermissionsExt;
        let full = self.shared.full_path(path);
        fs::set_permissions(&full, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(map_io_error)
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let full = self.shared.full_path(path);
        let outcome = run_blocking(move || chown_blocking(&full, uid, gid)).await;
        if let Err(err) = outcome {
            // Best effort; the mount usually is not root.
            warn!(path, %err, "chown failed, ignoring");
        }
        Ok(())
    }

    async fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let full = self.shared.full_path(path);
        let file =
            fs::OpenOptions::new().write(true).open(&full).await.map_err(map_io_error)?;
        file.set_len(size).await.map_err(map_io_error)
    }

    async fn utimens(&self, path: &str, atime: FileTime, mtime: FileTime) -> FsResult<()> {
        let full = self.shared.full_path(path);
        let atime = filetime::FileTime::from_unix_time(atime.seconds, atime.nanos);
        let mtime = filetime::FileTime::from_unix_time(mtime.seconds, mtime.nanos);
        let outcome =
            run_blocking(move || filetime::set_symlink_file_times(&full, atime, mtime)).await;
        if let Err(err) = outcome {
            // Best effort, as with chown.
            warn!(path, %err, "utimens failed, ignoring");
        }
        Ok(())
    }

    async fn utime(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        let full = self.shared.full_path(path);
        let atime = filetime::FileTime::from_unix_time(atime, 0);
        let mtime = filetime::FileTime::from_unix_time(mtime, 0);
        run_blocking(move || filetime::set_file_times(&full, atime, mtime)).await
    }

    async fn open(&self, path: &str, flags: OpenFlags) -> FsResult<Fh> {
        let full = self.shared.full_path(path);
        debug!(path, %full, flags = flags.0, "open");
        let file = run_blocking(move || open_with_flags(&full, flags.0)).await?;

        self.shared.stats.set(path, Shared::now_secs())?;
        // First store in the entry is the current placement for the
        // promote case; an already-queued path keeps its entry.
        let target = self.shared.stores.target().root.clone();
        let source = self.shared.stores.source().root.clone();
        self.shared.queue.set(path, 0, &[target.as_str(), source.as_str()])?;

        Ok(self.shared.handles.insert_file(file, flags.has_create()))
    }

    async fn read(&self, fh: Fh, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let open = self.shared.handles.file(fh)?;
        run_blocking(move || {
            let mut buf = vec![0u8; size as usize];
            let count = open.file.read_at(&mut buf, offset)?;
            buf.truncate(count);
            Ok(buf)
        })
        .await
    }

    async fn write(&self, fh: Fh, offset: u64, data: &[u8]) -> FsResult<u32> {
        let open = self.shared.handles.file(fh)?;
        let data = data.to_vec();
        let written = run_blocking(move || open.file.write_at(&data, offset)).await?;
        Ok(written as u32)
    }

    async fn stat_fs(&self, path: &str) -> FsResult<StatFs> {
        let full = self.shared.full_path(path);
        run_blocking(move || statvfs_blocking(&full)).await
    }

    async fn flush(&self, fh: Fh) -> FsResult<()> {
        debug!(fh, "flush");
        Ok(())
    }

    async fn release(&self, path: &str, fh: Fh) -> FsResult<()> {
        let Some(open) = self.shared.handles.remove_file(fh) else {
            return Err(FsError::BadDescriptor);
        };
        let created = open.created;
        debug!(path, fh, created, "release");
        drop(open);

        // Only plain opens of regular objects queue placement work;
        // creations migrate on a later open/release cycle.
        if created {
            return Ok(());
        }
        let root_full = self.shared.root_path(path);
        if matches!(fs::symlink_metadata(&root_full).await, Ok(meta) if meta.is_dir()) {
            debug!(path, "directory, skipping post-process queue");
            return Ok(());
        }
        if let Some(store) = self.shared.objmap.get(path, Level::L1)? {
            self.shared.queue.set(path, 0, &[store.as_str()])?;
        }
        Ok(())
    }

    async fn fsync(&self, fh: Fh, datasync: bool) -> FsResult<()> {
        let open = self.shared.handles.file(fh)?;
        run_blocking(move || {
            if datasync {
                open.file.sync_data()
            } else {
                open.file.sync_all()
            }
        })
        .await
    }

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> FsResult<()> {
        if name.is_empty() || value.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        debug!(path, name, "setxattr");
        self.shared.xattrs.insert(name.to_owned(), value.to_vec());
        Ok(())
    }

    async fn get_xattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        debug!(path, name, "getxattr");
        if let Some(value) = self.shared.xattrs.get(name) {
            return Ok(value.clone());
        }
        // Attributes set without a namespace still answer `user.` queries.
        if let Some(stripped) = name.strip_prefix("user.") {
            if let Some(value) = self.shared.xattrs.get(stripped) {
                return Ok(value.clone());
            }
        }
        Err(FsError::NoAttribute)
    }

    async fn list_xattr(&self, path: &str) -> FsResult<Vec<String>> {
        debug!(path, "listxattr");
        let mut names: Vec<String> =
            self.shared.xattrs.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn remove_xattr(&self, path: &str, name: &str) -> FsResult<()> {
        debug!(path, name, "removexattr");
        match self.shared.xattrs.remove(name) {
            Some(_) => Ok(()),
            None => Err(FsError::NoAttribute),
        }
    }

    async fn open_dir(&self, path: &str) -> FsResult<Fh> {
        let root_full = self.shared.root_path(path);
        let meta = fs::symlink_metadata(&root_full).await.map_err(map_io_error)?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(self.shared.handles.insert_dir(path.to_owned()))
    }

    async fn read_dir(&self, path: &str, fh: Fh, filler: &mut dyn DirFiller) -> FsResult<()> {
        self.shared.handles.dir(fh)?;
        let root_full = self.shared.root_path(path);

        let mut seen = HashSet::new();
        for name in [".", ".."] {
            seen.insert(name.to_owned());
            if !filler.push(name) {
                return Err(FsError::Full);
            }
        }

        let mut entries = fs::read_dir(&root_full).await.map_err(map_io_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(map_io_error)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if seen.insert(name.clone()) && !filler.push(&name) {
                warn!(path, "readdir filler refused entry, buffer full");
                return Err(FsError::Full);
            }
        }

        // Objects may live in a store with no stub under the root dir; the
        // map listing fills them in, order root dir first.
        self.shared.store_readdir(path, filler, &mut seen)
    }

    async fn release_dir(&self, fh: Fh) -> FsResult<()> {
        self.shared.handles.remove_dir(fh);
        Ok(())
    }

    async fn fsync_dir(&self, fh: Fh, _datasync: bool) -> FsResult<()> {
        debug!(fh, "fsyncdir");
        Ok(())
    }

    async fn init(&self) -> FsResult<()> {
        let shared = &self.shared;
        let map =
            TypeMap::load(&shared.config.meta_root, &shared.config.data_root, &shared.stores);
        *write_lock(&shared.rootmap) = map;

        let handle = Ppd::spawn(self.shared.clone());
        if let Some(old) = mutex_lock(&shared.ppd).replace(handle) {
            old.abort();
        }

        // Relative lookups anchor at the data root from here on; the meta
        // root keeps the indexes.
        *write_lock(&shared.rootdir) = shared.config.data_root.clone();
        info!(
            data_root = %shared.config.data_root,
            archive_root = %shared.stores.target().root,
            cache_mode = shared.config.cache_mode,
            "filesystem initialized"
        );
        Ok(())
    }

    async fn destroy(&self) {
        if let Some(ppd) = mutex_lock(&self.shared.ppd).take() {
            ppd.abort();
        }
        info!("filesystem shut down");
    }

    async fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        let full = self.shared.full_path(path);
        run_blocking(move || access_blocking(&full, mask)).await
    }

    async fn create(&self, path: &str, mode: u32) -> FsResult<Fh> {
        let full = self.shared.full_path(path);
        debug!(path, %full, mode, "create");
        self.shared.set_objmap(path, &full)?;
        let file = run_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(mode)
                .open(&full)
        })
        .await?;
        Ok(self.shared.handles.insert_file(file, true))
    }

    async fn ftruncate(&self, fh: Fh, size: u64) -> FsResult<()> {
        let open = self.shared.handles.file(fh)?;
        run_blocking(move || open.file.set_len(size)).await
    }

    async fn fget_attr(&self, fh: Fh) -> FsResult<FileAttr> {
        let open = self.shared.handles.file(fh)?;
        let meta = run_blocking(move || open.file.metadata()).await?;
        Ok(FileAttr::from_metadata(&meta))
    }

    async fn ioctl(&self, path: &str, cmd: u32, compat: bool) -> FsResult<()> {
        if path == "/" {
            return Err(FsError::InvalidArgument);
        }
        if compat {
            return Err(FsError::NotSupported);
        }
        match ControlCommand::from_raw(cmd) {
            Some(ControlCommand::PrintDb) => {
                info!("control: dumping indexes");
                self.shared.objmap.dump_to_log(Level::L1);
                self.shared.objmap.dump_to_log(Level::L2);
                self.shared.queue.dump_to_log();
                self.shared.stats.dump_to_log();
                Ok(())
            }
            Some(ControlCommand::Evict) => {
                info!("control: evicting idle hot copies");
                Ppd::new(self.shared.clone()).evict().await;
                Ok(())
            }
            None => Err(FsError::InvalidArgument),
        }
    }
}

async fn run_blocking<T, F>(job: F) -> FsResult<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(job).await.map_err(|_| FsError::Io)?.map_err(map_io_error)
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cpath(path: &str) -> std::io::Result<CString> {
    CString::new(path).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))
}

fn open_with_flags(full: &str, flags: i32) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => {
            options.write(true);
        }
        libc::O_RDWR => {
            options.read(true).write(true);
        }
        _ => {
            options.read(true);
        }
    }
    options.custom_flags(flags & !(libc::O_ACCMODE | libc::O_CREAT));
    options.open(full)
}

fn make_node_blocking(full: &str, mode: u32, dev: u64) -> std::io::Result<()> {
    let kind = mode & libc::S_IFMT;
    if kind == libc::S_IFREG || kind == 0 {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode & 0o7777)
            .open(full)?;
        drop(file);
        return Ok(());
    }
    let path = cpath(full)?;
    let ret = if kind == libc::S_IFIFO {
        unsafe { libc::mkfifo(path.as_ptr(), mode as libc::mode_t) }
    } else {
        unsafe { libc::mknod(path.as_ptr(), mode as libc::mode_t, dev as libc::dev_t) }
    };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn chown_blocking(full: &str, uid: u32, gid: u32) -> std::io::Result<()> {
    let path = cpath(full)?;
    let ret = unsafe { libc::lchown(path.as_ptr(), uid as libc::uid_t, gid as libc::gid_t) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn access_blocking(full: &str, mask: i32) -> std::io::Result<()> {
    let path = cpath(full)?;
    let ret = unsafe { libc::access(path.as_ptr(), mask) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn statvfs_blocking(full: &str) -> std::io::Result<StatFs> {
    let path = cpath(full)?;
    let mut raw: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(path.as_ptr(), &mut raw) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(StatFs {
        block_size: raw.f_bsize as u64,
        fragment_size: raw.f_frsize as u64,
        blocks: raw.f_blocks as u64,
        blocks_free: raw.f_bfree as u64,
        blocks_available: raw.f_bavail as u64,
        files: raw.f_files as u64,
        files_free: raw.f_ffree as u64,
        name_max: raw.f_namemax as u64,
    })
}
