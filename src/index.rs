//! Ordered persistent byte-keyed map, the backing of every on-disk index.
//!
//! Single-key operations are atomic and durable by the time they return;
//! nothing here needs multi-key transactions.

use std::path::Path;

use fjall::{Config, Keyspace, Partition, PartitionCreateOptions, PersistMode};

use crate::error::FsResult;

/// One embedded index directory: a keyspace with a single ordered partition.
pub struct KvIndex {
    keyspace: Keyspace,
    records: Partition,
}

impl KvIndex {
    /// Open (creating if missing) the index rooted at `path`.
    pub fn open(path: &Path) -> FsResult<Self> {
        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        Ok(Self { keyspace, records })
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> FsResult<()> {
        self.records.insert(key.as_ref(), value.as_ref())?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> FsResult<Option<Vec<u8>>> {
        Ok(self.records.get(key.as_ref())?.map(|slice| slice.to_vec()))
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> FsResult<()> {
        self.records.remove(key.as_ref())?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    /// Snapshot of every record in ascending key order, smallest key first.
    pub fn entries(&self) -> FsResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for pair in self.records.iter() {
            let (key, value) = pair?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}
