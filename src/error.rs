//! Error taxonomy shared by every filesystem-facing operation.
//!
//! The kernel bridge speaks negative POSIX errno values; everything inside
//! the crate speaks [`FsError`], and [`FsError::errno`] performs the
//! translation at the boundary.

use std::fmt;
use std::io;

/// Convenient result alias used by all filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Error kinds surfaced to the filesystem bridge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FsError {
    /// ENOENT
    NotFound,
    /// EACCES
    PermissionDenied,
    /// EEXIST
    AlreadyExists,
    /// ENOTDIR
    NotADirectory,
    /// EISDIR
    IsADirectory,
    /// EINVAL
    InvalidArgument,
    /// ENOSYS
    NotSupported,
    /// ENAMETOOLONG
    NameTooLong,
    /// ENOTEMPTY
    NotEmpty,
    /// EROFS
    ReadOnly,
    /// ENOSPC
    NoSpace,
    /// ENOMEM - a readdir filler refused another entry
    Full,
    /// ENODATA - missing extended attribute
    NoAttribute,
    /// EBADF - unknown file handle
    BadDescriptor,
    /// EIO - failure inside an embedded index
    Index,
    /// EIO
    Io,
}

impl FsError {
    /// The negative errno value handed to the kernel bridge.
    pub fn errno(self) -> i32 {
        let raw = match self {
            FsError::NotFound => libc::ENOENT,
            FsError::PermissionDenied => libc::EACCES,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::NotSupported => libc::ENOSYS,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::ReadOnly => libc::EROFS,
            FsError::NoSpace => libc::ENOSPC,
            FsError::Full => libc::ENOMEM,
            FsError::NoAttribute => libc::ENODATA,
            FsError::BadDescriptor => libc::EBADF,
            FsError::Index | FsError::Io => libc::EIO,
        };
        -raw
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FsError::NotFound => "no such file or directory",
            FsError::PermissionDenied => "permission denied",
            FsError::AlreadyExists => "file exists",
            FsError::NotADirectory => "not a directory",
            FsError::IsADirectory => "is a directory",
            FsError::InvalidArgument => "invalid argument",
            FsError::NotSupported => "operation not supported",
            FsError::NameTooLong => "name too long",
            FsError::NotEmpty => "directory not empty",
            FsError::ReadOnly => "read-only file system",
            FsError::NoSpace => "no space left on device",
            FsError::Full => "directory buffer full",
            FsError::NoAttribute => "no such attribute",
            FsError::BadDescriptor => "bad file handle",
            FsError::Index => "index error",
            FsError::Io => "i/o error",
        };
        f.write_str(text)
    }
}

impl std::error::Error for FsError {}

impl From<fjall::Error> for FsError {
    fn from(_: fjall::Error) -> Self {
        FsError::Index
    }
}

/// Map a host `io::Error` to the closest filesystem error code.
pub fn map_io_error(err: io::Error) -> FsError {
    use io::ErrorKind::*;
    match err.kind() {
        NotFound => FsError::NotFound,
        PermissionDenied => FsError::PermissionDenied,
        AlreadyExists => FsError::AlreadyExists,
        InvalidInput | InvalidData => FsError::InvalidArgument,
        NotADirectory => FsError::NotADirectory,
        IsADirectory => FsError::IsADirectory,
        DirectoryNotEmpty => FsError::NotEmpty,
        ReadOnlyFilesystem => FsError::ReadOnly,
        StorageFull | OutOfMemory => FsError::NoSpace,
        _ => FsError::Io,
    }
}
