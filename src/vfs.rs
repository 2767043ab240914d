//! Operation vtable the kernel bridge drives.
//!
//! Every method takes the logical path exactly as the bridge delivers it:
//! a byte string rooted at `/`, no trailing slash except for the root. The
//! bridge converts an [`FsError`](crate::error::FsError) into its negative
//! errno via [`FsError::errno`](crate::error::FsError::errno).

use async_trait::async_trait;

use crate::error::FsResult;

/// Opaque file/directory handle stashed by `open`/`create`/`opendir`.
pub type Fh = u64;

/// `O_*` flag bits handed through by the kernel bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub i32);

impl OpenFlags {
    pub fn has_create(self) -> bool {
        self.0 & libc::O_CREAT != 0
    }
}

/// POSIX-like file kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Fifo,
    Socket,
}

/// Timestamp with nanosecond precision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FileTime {
    pub seconds: i64,
    pub nanos: u32,
}

/// Attributes of one filesystem entry, the `lstat` answer.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttr {
    pub kind: FileKind,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub used: u64,
    pub rdev: u64,
    pub fileid: u64,
    pub atime: FileTime,
    pub mtime: FileTime,
    pub ctime: FileTime,
}

impl FileAttr {
    /// Translate host metadata into the bridge-facing attribute record.
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::{FileTypeExt, MetadataExt};
        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_char_device() {
            FileKind::CharacterDevice
        } else if file_type.is_block_device() {
            FileKind::BlockDevice
        } else if file_type.is_fifo() {
            FileKind::Fifo
        } else if file_type.is_socket() {
            FileKind::Socket
        } else {
            FileKind::Regular
        };

        Self {
            kind,
            mode: meta.mode(),
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            used: meta.blocks().saturating_mul(512),
            rdev: meta.rdev(),
            fileid: meta.ino(),
            atime: FileTime { seconds: meta.atime(), nanos: meta.atime_nsec() as u32 },
            mtime: FileTime { seconds: meta.mtime(), nanos: meta.mtime_nsec() as u32 },
            ctime: FileTime { seconds: meta.ctime(), nanos: meta.ctime_nsec() as u32 },
        }
    }
}

/// Filesystem statistics for `statfs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u64,
    pub fragment_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u64,
}

/// Receiver for directory entries; `push` returns false once the caller's
/// buffer is full.
pub trait DirFiller: Send {
    fn push(&mut self, name: &str) -> bool;
}

impl DirFiller for Vec<String> {
    fn push(&mut self, name: &str) -> bool {
        Vec::push(self, name.to_owned());
        true
    }
}

/// The operation vtable registered with the kernel bridge.
#[async_trait]
pub trait Vfs: Send + Sync {
    /// `lstat` of the resolved physical path. Used as an existence probe on
    /// the hot path, so failures come back unlogged.
    async fn get_attr(&self, path: &str) -> FsResult<FileAttr>;

    /// Target of a symbolic link.
    async fn read_link(&self, path: &str) -> FsResult<String>;

    /// Create a file node (regular, fifo or device) and register its hot
    /// placement.
    async fn make_node(&self, path: &str, mode: u32, dev: u64) -> FsResult<()>;

    /// Create a directory under the root dir and in every registered store.
    async fn make_dir(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Remove a file from whichever tiers hold it, with its index entries.
    async fn unlink(&self, path: &str) -> FsResult<()>;

    /// Remove a directory from every registered store and the root dir.
    async fn remove_dir(&self, path: &str) -> FsResult<()>;

    /// Create a symbolic link at `link` pointing to `target`.
    async fn make_symlink(&self, target: &str, link: &str) -> FsResult<()>;

    /// Rename a file or directory; non-directories carry their placement
    /// with them.
    async fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    /// Create a hard link.
    async fn link(&self, path: &str, new_path: &str) -> FsResult<()>;

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Ownership change; errors are squashed for non-root mounts.
    async fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()>;

    async fn truncate(&self, path: &str, size: u64) -> FsResult<()>;

    /// Timestamp update with nanosecond precision; errors are squashed.
    async fn utimens(&self, path: &str, atime: FileTime, mtime: FileTime) -> FsResult<()>;

    /// Timestamp update with second precision.
    async fn utime(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()>;

    /// Open the resolved physical file, record the access and queue the
    /// path for eventual placement work.
    async fn open(&self, path: &str, flags: OpenFlags) -> FsResult<Fh>;

    /// Positioned read on an open handle.
    async fn read(&self, fh: Fh, offset: u64, size: u32) -> FsResult<Vec<u8>>;

    /// Positioned write on an open handle.
    async fn write(&self, fh: Fh, offset: u64, data: &[u8]) -> FsResult<u32>;

    async fn stat_fs(&self, path: &str) -> FsResult<StatFs>;

    async fn flush(&self, fh: Fh) -> FsResult<()>;

    /// Close a handle; plain (non-creating) opens of regular objects queue
    /// a demotion for their current placement.
    async fn release(&self, path: &str, fh: Fh) -> FsResult<()>;

    async fn fsync(&self, fh: Fh, datasync: bool) -> FsResult<()>;

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> FsResult<()>;

    async fn get_xattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>>;

    async fn list_xattr(&self, path: &str) -> FsResult<Vec<String>>;

    async fn remove_xattr(&self, path: &str, name: &str) -> FsResult<()>;

    /// Open a directory under the root dir.
    async fn open_dir(&self, path: &str) -> FsResult<Fh>;

    /// Feed `filler` the union of the root-dir entries and the object-map
    /// children, duplicates suppressed.
    async fn read_dir(&self, path: &str, fh: Fh, filler: &mut dyn DirFiller) -> FsResult<()>;

    async fn release_dir(&self, fh: Fh) -> FsResult<()>;

    async fn fsync_dir(&self, fh: Fh, datasync: bool) -> FsResult<()>;

    /// Load the type map, start the post-processor and re-anchor relative
    /// lookups at the data root.
    async fn init(&self) -> FsResult<()>;

    /// Stop background work on filesystem exit.
    async fn destroy(&self);

    async fn access(&self, path: &str, mask: i32) -> FsResult<()>;

    /// Create and open a regular file, registering its hot placement.
    async fn create(&self, path: &str, mode: u32) -> FsResult<Fh>;

    async fn ftruncate(&self, fh: Fh, size: u64) -> FsResult<()>;

    /// Attributes from an open handle; an existence probe like `get_attr`.
    async fn fget_attr(&self, fh: Fh) -> FsResult<FileAttr>;

    /// Control channel; see [`crate::control`] for the two commands.
    async fn ioctl(&self, path: &str, cmd: u32, compat: bool) -> FsResult<()>;
}
