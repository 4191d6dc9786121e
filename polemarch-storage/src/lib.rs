pub mod db;
pub mod kv;

pub use db::{Commit, Storage, SCHEMA_VERSION};
pub use kv::{KvStore, MemoryStore, WriteOp};
#[cfg(feature = "rocksdb")]
pub use kv::RocksStore;
