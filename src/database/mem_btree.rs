use crate::database::KvStore;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemBTree {
    data: RwLock<BTreeMap<String, String>>,
}

impl KvStore for MemBTree {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.data
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
