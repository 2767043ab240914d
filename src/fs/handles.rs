//! Table of open file and directory handles.
//!
//! Handles are plain `u64`s the bridge carries between `open`/`create` and
//! the positioned I/O calls. Descriptors are shared as `Arc<File>` so a
//! release during an in-flight read only closes the descriptor once the
//! last reader drops it.

use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{FsError, FsResult};
use crate::vfs::Fh;

#[derive(Clone)]
pub(crate) struct OpenFile {
    pub(crate) file: Arc<File>,
    pub(crate) created: bool,
}

#[derive(Default)]
pub(crate) struct HandleTable {
    next: AtomicU64,
    files: DashMap<Fh, OpenFile>,
    dirs: DashMap<Fh, String>,
}

impl HandleTable {
    fn next_fh(&self) -> Fh {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn insert_file(&self, file: File, created: bool) -> Fh {
        let fh = self.next_fh();
        self.files.insert(fh, OpenFile { file: Arc::new(file), created });
        fh
    }

    pub(crate) fn file(&self, fh: Fh) -> FsResult<OpenFile> {
        self.files.get(&fh).map(|entry| entry.clone()).ok_or(FsError::BadDescriptor)
    }

    pub(crate) fn remove_file(&self, fh: Fh) -> Option<OpenFile> {
        self.files.remove(&fh).map(|(_, open)| open)
    }

    pub(crate) fn insert_dir(&self, path: String) -> Fh {
        let fh = self.next_fh();
        self.dirs.insert(fh, path);
        fh
    }

    pub(crate) fn dir(&self, fh: Fh) -> FsResult<String> {
        self.dirs.get(&fh).map(|entry| entry.clone()).ok_or(FsError::BadDescriptor)
    }

    pub(crate) fn remove_dir(&self, fh: Fh) -> Option<String> {
        self.dirs.remove(&fh).map(|(_, path)| path)
    }
}
