pub(crate) mod mem_btree;
mod redb;
mod sled;

use crate::database::mem_btree::MemBTree;
use crate::database::redb::Redb;
use crate::database::sled::Sled;
use anyhow::Result;
use clap::ValueEnum;
use std::sync::Arc;

/// String-keyed store exercised by the workload. `get` and `set` may fail on
/// any transport or store error; callers decide how to account for that.
pub trait KvStore: Send + Sync {
    fn init(&self) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Copy, Clone, Debug, ValueEnum)]
// Update open_store when adding new variation
pub enum StoreKind {
    MemBtree,
    Redb,
    Sled,
}

pub fn open_store(kind: StoreKind) -> Result<Arc<dyn KvStore>> {
    match kind {
        StoreKind::MemBtree => Ok(Arc::new(MemBTree::default())),
        StoreKind::Redb => Ok(Arc::new(Redb::new()?)),
        StoreKind::Sled => Ok(Arc::new(Sled::new()?)),
    }
}
