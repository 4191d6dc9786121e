use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered byte-keyed store. A batch is applied atomically or not at all.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()>;
    /// Every pair whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let map = self.map.read().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut map = self.map.write().map_err(|_| anyhow!("memory store poisoned"))?;
        for op in ops {
            match op {
                WriteOp::Put(key, value) => {
                    map.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(feature = "rocksdb")]
pub struct RocksStore {
    db: rocksdb::DB,
}

#[cfg(feature = "rocksdb")]
impl RocksStore {
    pub fn open(path: &str) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = rocksdb::DB::open(&opts, path).map_err(|e| anyhow!("Failed to open DB: {}", e))?;
        Ok(Self { db })
    }
}

#[cfg(feature = "rocksdb")]
impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(key).map_err(|e| anyhow!("DB read error: {}", e))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut batch = rocksdb::WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put(key, value) => batch.put(key, value),
                WriteOp::Delete(key) => batch.delete(key),
            }
        }
        self.db.write(batch).map_err(|e| anyhow!("DB write error: {}", e))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator(mode) {
            let (key, value) = item.map_err(|e| anyhow!("DB scan error: {}", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_stops_at_prefix_boundary() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![
                WriteOp::Put(b"a/1".to_vec(), b"x".to_vec()),
                WriteOp::Put(b"a/2".to_vec(), b"y".to_vec()),
                WriteOp::Put(b"b/1".to_vec(), b"z".to_vec()),
            ])
            .unwrap();
        let found = store.scan_prefix(b"a/").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].1, b"y".to_vec());

        store.write_batch(vec![WriteOp::Delete(b"a/1".to_vec())]).unwrap();
        assert_eq!(store.get(b"a/1").unwrap(), None);
        assert_eq!(store.scan_prefix(b"a/").unwrap().len(), 1);
    }
}
