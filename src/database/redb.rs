use crate::database::KvStore;
use anyhow::Result;
use redb::{Database, ReadableDatabase, TableDefinition};
use tempfile::NamedTempFile;

static TABLE: TableDefinition<&str, &str> = TableDefinition::new("records");

pub struct Redb {
    _f: NamedTempFile,
    db: Database,
}

impl Redb {
    pub fn new() -> Result<Self> {
        let f = NamedTempFile::new()?;
        let db = Database::create(f.path())?;
        Ok(Redb { _f: f, db })
    }
}

impl KvStore for Redb {
    fn init(&self) -> Result<()> {
        let tx = self.db.begin_write()?;
        {
            let _ = tx.open_table(TABLE)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let tx = self.db.begin_read()?;
        let t = tx.open_table(TABLE)?;
        Ok(t.get(key)?.map(|guard| guard.value().to_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let tx = self.db.begin_write()?;
        {
            let mut t = tx.open_table(TABLE)?;
            t.insert(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }
}
