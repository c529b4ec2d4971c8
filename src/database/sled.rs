use crate::database::KvStore;
use anyhow::Result;
use tempfile::TempDir;

pub struct Sled {
    db: sled::Db,
    _f: TempDir,
}

impl Sled {
    pub fn new() -> Result<Self> {
        let f = TempDir::new()?;
        let db = sled::open(f.path())?;
        Ok(Sled { db, _f: f })
    }
}

impl KvStore for Sled {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .get(key)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.insert(key, value.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_tree() {
        let store = Sled::new().unwrap();
        store.init().unwrap();
        assert_eq!(store.get("42").unwrap(), None);

        store.set("42", "payload").unwrap();
        assert_eq!(store.get("42").unwrap(), Some("payload".to_owned()));
    }
}
