//! Persistent post-process queue: one record per logical path awaiting
//! background placement work, plus a monotonic obj-id counter under the
//! reserved `__obj_gid__` key.
//!
//! Every operation holds the process-wide PP lock for its full duration;
//! the counter is only ever bumped under that lock. Entries are written
//! with an explicit field-by-field codec, never a memory dump.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{info, warn};

use crate::error::{FsError, FsResult};
use crate::index::KvIndex;
use crate::paths;

/// Queue index directory under the meta root.
pub const POSTPROCESS_DIR: &str = ".postprocess";

/// Upper bound on the store roots one entry may carry.
pub const MAX_STORE_LEVEL: usize = 5;

/// Control-channel file; never queued.
pub const CTL_PATH: &str = "/.ifsctl";

/// Reserved key persisting the obj-id counter.
const OBJ_GID_KEY: &str = "__obj_gid__";

/// One queued unit of placement work.
///
/// `store_paths[0]` is the placement the decision anchors on: the current
/// store for a promote, the hot store for a demote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpEntry {
    pub store_paths: Vec<String>,
    pub state: i32,
    pub obj_id: u64,
}

impl PpEntry {
    /// Little-endian record: store count, length-prefixed store roots,
    /// fixed-width state and obj-id.
    pub fn encode(&self) -> FsResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u8(self.store_paths.len() as u8).map_err(codec_err)?;
        for store in &self.store_paths {
            buf.write_u16::<LittleEndian>(store.len() as u16).map_err(codec_err)?;
            buf.extend_from_slice(store.as_bytes());
        }
        buf.write_i32::<LittleEndian>(self.state).map_err(codec_err)?;
        buf.write_u64::<LittleEndian>(self.obj_id).map_err(codec_err)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> FsResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let count = cursor.read_u8().map_err(codec_err)? as usize;
        if count > MAX_STORE_LEVEL {
            return Err(FsError::Index);
        }
        let mut store_paths = Vec::with_capacity(count);
        for _ in 0..count {
            let len = cursor.read_u16::<LittleEndian>().map_err(codec_err)? as usize;
            let mut raw = vec![0u8; len];
            cursor.read_exact(&mut raw).map_err(codec_err)?;
            store_paths.push(String::from_utf8(raw).map_err(|_| FsError::Index)?);
        }
        let state = cursor.read_i32::<LittleEndian>().map_err(codec_err)?;
        let obj_id = cursor.read_u64::<LittleEndian>().map_err(codec_err)?;
        Ok(Self { store_paths, state, obj_id })
    }
}

fn codec_err(_: std::io::Error) -> FsError {
    FsError::Index
}

/// Administrative keys live in the same namespace but are never entries.
fn is_reserved(key: &str) -> bool {
    key.len() >= 4 && key.starts_with("__") && key.ends_with("__")
}

pub struct PpQueue {
    inner: Mutex<PpQueueInner>,
}

struct PpQueueInner {
    index: KvIndex,
    obj_id: u64,
}

impl PpQueue {
    /// Open the queue and reload the persisted counter, if any.
    pub fn open(meta_root: &Path) -> FsResult<Self> {
        let index = KvIndex::open(&meta_root.join(POSTPROCESS_DIR))?;
        let obj_id = match index.get(OBJ_GID_KEY)? {
            Some(raw) => PpEntry::decode(&raw)?.obj_id,
            None => 0,
        };
        info!(obj_id, "post-process queue open");
        Ok(Self { inner: Mutex::new(PpQueueInner { index, obj_id }) })
    }

    /// Queue `path` unless it already is; an existing entry keeps its
    /// original obj-id. The counter is persisted before the entry.
    pub fn set(&self, path: &str, state: i32, store_paths: &[&str]) -> FsResult<()> {
        if path == CTL_PATH {
            return Ok(());
        }
        if store_paths.len() > MAX_STORE_LEVEL {
            return Err(FsError::InvalidArgument);
        }
        let mut inner = self.lock();
        if inner.index.get(path)?.is_some() {
            return Ok(());
        }
        let obj_id = alloc_obj_id(&mut inner)?;
        let entry = PpEntry {
            store_paths: store_paths.iter().map(|store| (*store).to_owned()).collect(),
            state,
            obj_id,
        };
        inner.index.put(path, entry.encode()?)
    }

    pub fn get(&self, path: &str) -> FsResult<Option<PpEntry>> {
        if path == CTL_PATH {
            return Ok(None);
        }
        let inner = self.lock();
        match inner.index.get(path)? {
            Some(raw) => Ok(Some(PpEntry::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Compare-and-delete: the entry is removed only while its stored
    /// obj-id still matches the caller's copy, so a path requeued after the
    /// caller read it survives. The reserved counter key is never deleted.
    pub fn delete(&self, path: &str, entry: &PpEntry) -> FsResult<()> {
        if is_reserved(path) {
            return Ok(());
        }
        let inner = self.lock();
        match inner.index.get(path)? {
            Some(raw) => {
                let stored = PpEntry::decode(&raw)?;
                if stored.obj_id != entry.obj_id {
                    warn!(
                        path,
                        caller_obj_id = entry.obj_id,
                        stored_obj_id = stored.obj_id,
                        "entry was requeued, keeping it"
                    );
                    return Ok(());
                }
            }
            None => return Ok(()),
        }
        inner.index.delete(path)
    }

    /// Key-ascending snapshot of queued work, administrative keys excluded.
    pub fn snapshot(&self) -> FsResult<Vec<(String, PpEntry)>> {
        let inner = self.lock();
        let mut out = Vec::new();
        for (key, value) in inner.index.entries()? {
            let Ok(key) = String::from_utf8(key) else {
                continue;
            };
            if is_reserved(&key) {
                continue;
            }
            out.push((key, PpEntry::decode(&value)?));
        }
        Ok(out)
    }

    /// Basenames of queued paths that are direct children of `prefix`.
    pub fn list(&self, prefix: &str) -> FsResult<Vec<String>> {
        let inner = self.lock();
        let mut out = Vec::new();
        for (key, _) in inner.index.entries()? {
            let Ok(key) = String::from_utf8(key) else {
                continue;
            };
            if is_reserved(&key) {
                continue;
            }
            if let Some(name) = paths::direct_child(&key, prefix) {
                out.push(name.to_owned());
            }
        }
        Ok(out)
    }

    pub fn dump_to_log(&self) {
        let entries = match self.snapshot() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%err, "queue dump failed");
                return;
            }
        };
        info!(count = entries.len(), obj_id = self.current_obj_id(), "queue dump");
        for (path, entry) in entries {
            info!(
                %path,
                obj_id = entry.obj_id,
                state = entry.state,
                stores = ?entry.store_paths,
                "queue entry"
            );
        }
    }

    /// Current value of the monotonic counter.
    pub fn current_obj_id(&self) -> u64 {
        self.lock().obj_id
    }

    fn lock(&self) -> MutexGuard<'_, PpQueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bump and persist the counter; call only with the PP lock held.
fn alloc_obj_id(inner: &mut PpQueueInner) -> FsResult<u64> {
    inner.obj_id += 1;
    let counter = PpEntry { store_paths: Vec::new(), state: 0, obj_id: inner.obj_id };
    inner.index.put(OBJ_GID_KEY, counter.encode()?)?;
    Ok(inner.obj_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips_all_fields() {
        let entry = PpEntry {
            store_paths: vec!["/data/cold".to_owned(), "/data/hot".to_owned()],
            state: 0,
            obj_id: 42,
        };
        let decoded = PpEntry::decode(&entry.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn truncated_records_are_rejected() {
        let entry = PpEntry { store_paths: vec!["/data/hot".to_owned()], state: 0, obj_id: 7 };
        let bytes = entry.encode().expect("encode");
        assert_eq!(PpEntry::decode(&bytes[..bytes.len() - 1]), Err(FsError::Index));
    }
}
