//! Two-level persistent object map: logical path to backing store root.
//!
//! L1 tracks the hot copy, L2 the cold copy. Both may exist for the same
//! path in cache mode; L1 is the authoritative read source when they do.
//! L2 is only opened in cache mode.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{FsError, FsResult};
use crate::index::KvIndex;
use crate::paths;

/// L1 index directory under the meta root.
pub const OBJMAP_L1_DIR: &str = ".objmap";
/// L2 index directory under the meta root, present in cache mode only.
pub const OBJMAP_L2_DIR: &str = ".objmap2";

/// Cache level selector. L1 is the default everywhere a level is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    L1,
    L2,
}

pub struct ObjMap {
    l1: KvIndex,
    l2: Option<KvIndex>,
}

impl ObjMap {
    pub fn open(meta_root: &Path, cache_mode: bool) -> FsResult<Self> {
        let l1 = KvIndex::open(&meta_root.join(OBJMAP_L1_DIR))?;
        let l2 = if cache_mode {
            Some(KvIndex::open(&meta_root.join(OBJMAP_L2_DIR))?)
        } else {
            None
        };
        Ok(Self { l1, l2 })
    }

    fn index(&self, level: Level) -> Option<&KvIndex> {
        match level {
            Level::L1 => Some(&self.l1),
            Level::L2 => self.l2.as_ref(),
        }
    }

    pub fn set(&self, path: &str, store: &str, level: Level) -> FsResult<()> {
        match self.index(level) {
            Some(index) => index.put(path, store),
            None => {
                debug!(path, store, "L2 map disabled, dropping entry");
                Ok(())
            }
        }
    }

    pub fn get(&self, path: &str, level: Level) -> FsResult<Option<String>> {
        let Some(index) = self.index(level) else {
            return Ok(None);
        };
        let Some(value) = index.get(path)? else {
            return Ok(None);
        };
        String::from_utf8(value).map(Some).map_err(|_| FsError::Index)
    }

    pub fn delete(&self, path: &str, level: Level) -> FsResult<()> {
        match self.index(level) {
            Some(index) => index.delete(path),
            None => Ok(()),
        }
    }

    /// Basenames of every entry that is a direct child of `prefix`.
    ///
    /// `prefix` comes without a trailing separator except for the root;
    /// grandchildren are excluded.
    pub fn list(&self, prefix: &str, level: Level) -> FsResult<Vec<String>> {
        let Some(index) = self.index(level) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (key, _) in index.entries()? {
            let Ok(key) = String::from_utf8(key) else {
                continue;
            };
            if let Some(name) = paths::direct_child(&key, prefix) {
                out.push(name.to_owned());
            }
        }
        Ok(out)
    }

    /// Snapshot of every `(path, store)` pair at `level`.
    pub fn entries(&self, level: Level) -> FsResult<Vec<(String, String)>> {
        let Some(index) = self.index(level) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (key, value) in index.entries()? {
            match (String::from_utf8(key), String::from_utf8(value)) {
                (Ok(path), Ok(store)) => out.push((path, store)),
                _ => return Err(FsError::Index),
            }
        }
        Ok(out)
    }

    pub fn dump_to_log(&self, level: Level) {
        if self.index(level).is_none() {
            info!(?level, "object map level not open");
            return;
        }
        let entries = match self.entries(level) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(?level, %err, "object map dump failed");
                return;
            }
        };
        info!(?level, count = entries.len(), "object map dump");
        for (path, store) in entries {
            info!(%path, %store, ?level, "object map entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_map(cache_mode: bool) -> (TempDir, ObjMap) {
        let dir = TempDir::new().expect("create temp dir");
        let map = ObjMap::open(dir.path(), cache_mode).expect("open objmap");
        (dir, map)
    }

    #[test]
    fn list_returns_only_direct_children() {
        let (_dir, map) = open_map(true);
        map.set("/a.txt", "/stores/x", Level::L1).expect("set");
        map.set("/d/x", "/stores/x", Level::L1).expect("set");
        map.set("/d/y", "/stores/y", Level::L1).expect("set");
        map.set("/d/e/f", "/stores/x", Level::L1).expect("set");

        let mut root = map.list("/", Level::L1).expect("list root");
        root.sort();
        assert_eq!(root, vec!["a.txt"]);

        let mut under_d = map.list("/d", Level::L1).expect("list /d");
        under_d.sort();
        assert_eq!(under_d, vec!["x", "y"]);
    }

    #[test]
    fn disabled_l2_reads_as_empty() {
        let (_dir, map) = open_map(false);
        map.set("/a", "/stores/x", Level::L2).expect("set is dropped");
        assert_eq!(map.get("/a", Level::L2).expect("get"), None);
        assert!(map.list("/", Level::L2).expect("list").is_empty());
    }
}
