//! Background post-processor: drains the queue on a fixed cadence, moving
//! objects between the hot and cold tiers, and owns the L1 eviction pass.
//!
//! Migrations run outside the PP lock; the compare-and-delete on the queue
//! makes sure work queued while a migration was in flight survives.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::fs::Shared;
use crate::objmap::Level;
use crate::paths;
use crate::postprocess::PpEntry;
use crate::store;

pub(crate) struct Ppd {
    shared: Arc<Shared>,
}

impl Ppd {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Start the long-lived worker task.
    pub(crate) fn spawn(shared: Arc<Shared>) -> JoinHandle<()> {
        tokio::spawn(Self { shared }.run())
    }

    async fn run(self) {
        info!(
            interval_secs = self.shared.config.postprocess_interval.as_secs(),
            "post-processor started"
        );
        loop {
            sleep(self.shared.config.postprocess_interval).await;
            self.sweep().await;
        }
    }

    /// One pass over the queue snapshot.
    pub(crate) async fn sweep(&self) {
        let entries = match self.shared.queue.snapshot() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%err, "cannot read post-process queue");
                return;
            }
        };
        for (path, entry) in entries {
            self.process_entry(&path, &entry).await;
        }
    }

    async fn process_entry(&self, path: &str, entry: &PpEntry) {
        let Some(anchor) = entry.store_paths.first() else {
            debug!(path, "queue entry has no store, skipping");
            return;
        };
        let full = paths::join(anchor, path);
        if tokio::fs::symlink_metadata(&full).await.is_err() {
            // Nothing at the recorded placement; the entry is moot.
            debug!(path, %anchor, "nothing to process, dequeueing");
            self.dequeue(path, entry);
            return;
        }

        let source = self.shared.stores.source().clone();
        let target = self.shared.stores.target().clone();
        if *anchor == source.root {
            self.demote(path, entry, &source.root, &target.root, source.is_cached).await;
        } else if *anchor == target.root {
            self.promote(path, entry, &target.root, &source.root).await;
        } else {
            debug!(path, %anchor, "placement is not a managed tier, leaving queued");
        }
    }

    async fn demote(
        &self,
        path: &str,
        entry: &PpEntry,
        source_root: &str,
        target_root: &str,
        keep_source: bool,
    ) {
        info!(path, from = source_root, to = target_root, "demoting");
        if let Err(err) = store::migrate(path, source_root, target_root, keep_source).await {
            warn!(path, %err, "demotion failed, leaving queued");
            return;
        }
        // In cache mode the hot copy stays and only L2 learns about the
        // cold one; otherwise the hot placement itself moves.
        let level = if self.shared.config.cache_mode { Level::L2 } else { Level::L1 };
        if let Err(err) = self.shared.objmap.set(path, target_root, level) {
            warn!(path, %err, "cannot record demoted placement, leaving queued");
            return;
        }
        info!(path, to = target_root, "demoted");
        self.dequeue(path, entry);
    }

    async fn promote(&self, path: &str, entry: &PpEntry, target_root: &str, source_root: &str) {
        info!(path, from = target_root, to = source_root, "promoting");
        // Promotion always copies; the cold copy stays authoritative cold.
        if let Err(err) = store::migrate(path, target_root, source_root, true).await {
            warn!(path, %err, "promotion failed, leaving queued");
            return;
        }
        if let Err(err) = self.shared.objmap.set(path, source_root, Level::L1) {
            warn!(path, %err, "cannot record promoted placement, leaving queued");
            return;
        }
        info!(path, to = source_root, "promoted");
        self.dequeue(path, entry);
    }

    fn dequeue(&self, path: &str, entry: &PpEntry) {
        if let Err(err) = self.shared.queue.delete(path, entry) {
            warn!(path, %err, "cannot remove queue entry");
        }
    }

    /// Eviction pass over L1: drop hot copies that have a cold twin and no
    /// recorded access since the stats were last cleared.
    pub(crate) async fn evict(&self) {
        let entries = match self.shared.objmap.entries(Level::L1) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%err, "cannot read L1 map for eviction");
                return;
            }
        };
        for (path, store) in entries {
            let full = paths::join(&store, &path);
            if tokio::fs::symlink_metadata(&full).await.is_err() {
                continue;
            }
            let accessed = match self.shared.stats.get(&path) {
                Ok(record) => record.is_some(),
                Err(err) => {
                    warn!(%path, %err, "cannot read stats, keeping hot copy");
                    continue;
                }
            };
            if accessed {
                continue;
            }
            let has_cold = match self.shared.objmap.get(&path, Level::L2) {
                Ok(record) => record.is_some(),
                Err(err) => {
                    warn!(%path, %err, "cannot read L2 map, keeping hot copy");
                    continue;
                }
            };
            if !has_cold {
                continue;
            }

            info!(%path, %store, "evicting idle hot copy");
            if let Err(err) = tokio::fs::remove_file(&full).await {
                warn!(%path, %err, "evict unlink failed");
            }
            if let Err(err) = self.shared.objmap.delete(&path, Level::L1) {
                warn!(%path, %err, "cannot remove evicted L1 entry");
            }
        }
    }
}
