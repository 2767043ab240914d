//! Access-stats index: logical path to the last-open timestamp, in seconds.
//!
//! Stats track the hot tier only; eviction treats a missing record as "not
//! accessed since the stats were last cleared". Values are stored as
//! decimal ASCII.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{FsError, FsResult};
use crate::index::KvIndex;
use crate::paths;

/// Stats index directory under the meta root.
pub const STATS_DIR: &str = ".stats";

pub struct StatsDb {
    index: KvIndex,
}

impl StatsDb {
    pub fn open(meta_root: &Path) -> FsResult<Self> {
        Ok(Self { index: KvIndex::open(&meta_root.join(STATS_DIR))? })
    }

    pub fn set(&self, path: &str, timestamp: u64) -> FsResult<()> {
        self.index.put(path, timestamp.to_string())
    }

    pub fn get(&self, path: &str) -> FsResult<Option<u64>> {
        let Some(raw) = self.index.get(path)? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&raw).map_err(|_| FsError::Index)?;
        text.parse().map(Some).map_err(|_| FsError::Index)
    }

    pub fn delete(&self, path: &str) -> FsResult<()> {
        self.index.delete(path)
    }

    /// Basenames of tracked paths that are direct children of `prefix`.
    pub fn list(&self, prefix: &str) -> FsResult<Vec<String>> {
        let mut out = Vec::new();
        for (key, _) in self.index.entries()? {
            let Ok(key) = String::from_utf8(key) else {
                continue;
            };
            if let Some(name) = paths::direct_child(&key, prefix) {
                out.push(name.to_owned());
            }
        }
        Ok(out)
    }

    pub fn dump_to_log(&self) {
        let entries = match self.index.entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%err, "stats dump failed");
                return;
            }
        };
        info!(count = entries.len(), "stats dump");
        for (key, value) in entries {
            info!(
                path = %String::from_utf8_lossy(&key),
                opened = %String::from_utf8_lossy(&value),
                "stats entry"
            );
        }
    }
}
