//! The database: a registry of named tables under one base directory.
//!
//! Each table is an index in its own file, `<base>/<name>.btree` or
//! `<base>/<name>.hash`, with a `<name>.meta` sidecar holding the state the
//! index needs at open (root page / directory). Table names are
//! case-insensitive and stored lowercase.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::errors::{Error, Result};
use crate::index::{Index, IndexMeta, IndexType};
use crate::pager::Pager;

pub struct Database {
    base: PathBuf,
    tables: RwLock<HashMap<String, Arc<Index>>>,
    log_file: Mutex<Option<File>>,
}

impl Database {
    /// Open the database at `base`, creating the directory if needed and
    /// opening every index file already present.
    pub fn open<P: AsRef<Path>>(base: P) -> Result<Database> {
        let base = base.as_ref().to_path_buf();
        std::fs::create_dir_all(&base)?;
        let db = Database {
            base: base.clone(),
            tables: RwLock::new(HashMap::new()),
            log_file: Mutex::new(None),
        };
        for dir_entry in std::fs::read_dir(&base)? {
            let path = dir_entry?.path();
            let index_type = match path.extension().and_then(|e| e.to_str()) {
                Some("btree") => IndexType::BTree,
                Some("hash") => IndexType::Hash,
                _ => continue,
            };
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_lowercase(),
                None => continue,
            };
            let meta = IndexMeta::read_from(&db.meta_path(&name))?;
            if meta_kind(&meta) != index_type {
                return Err(Error::CorruptFile(path.display().to_string()));
            }
            let pager = Arc::new(Pager::open(&path)?);
            let index = Index::open(pager, name.clone(), meta)?;
            db.tables.write().insert(name, Arc::new(index));
        }
        Ok(db)
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    fn table_path(&self, name: &str, index_type: IndexType) -> PathBuf {
        self.base.join(format!("{name}.{}", index_type.extension()))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.base.join(format!("{name}.meta"))
    }

    /// Create a new table backed by a fresh index file.
    pub fn create_table(&self, index_type: IndexType, name: &str) -> Result<Arc<Index>> {
        let name = name.to_lowercase();
        let mut tables = self.tables.write();
        if tables.contains_key(&name) {
            return Err(Error::Duplicate);
        }
        let pager = Arc::new(Pager::open(self.table_path(&name, index_type))?);
        let index = Arc::new(Index::create(index_type, pager, name.clone())?);
        index.meta().write_to(&self.meta_path(&name))?;
        tables.insert(name, index.clone());
        Ok(index)
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<Index>> {
        let name = name.to_lowercase();
        self.tables
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("table {name} not found")))
    }

    pub fn get_tables(&self) -> Vec<Arc<Index>> {
        self.tables.read().values().cloned().collect()
    }

    /// Close a table and delete its files.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let name = name.to_lowercase();
        let index = match self.tables.write().remove(&name) {
            Some(index) => index,
            None => return Err(Error::InvalidInput(format!("table {name} not found"))),
        };
        let index_type = index.index_type();
        index.close()?;
        std::fs::remove_file(self.table_path(&name, index_type))?;
        std::fs::remove_file(self.meta_path(&name))?;
        Ok(())
    }

    /// Rewrite a table's `.meta` sidecar from its live state.
    pub fn write_table_meta(&self, index: &Index) -> Result<()> {
        index.meta().write_to(&self.meta_path(index.name()))
    }

    /// Create (or reopen) the write-ahead log file and keep its handle.
    pub fn create_log_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path.as_ref())?;
        *self.log_file.lock() = Some(file);
        Ok(())
    }

    /// Flush every table and its meta sidecar, then close the pagers.
    pub fn close(&self) -> Result<()> {
        let tables = self.tables.read();
        for index in tables.values() {
            self.write_table_meta(index)?;
            index.close()?;
        }
        if let Some(file) = self.log_file.lock().take() {
            file.sync_all()?;
        }
        Ok(())
    }
}

fn meta_kind(meta: &IndexMeta) -> IndexType {
    match meta {
        IndexMeta::BTree { .. } => IndexType::BTree,
        IndexMeta::Hash { .. } => IndexType::Hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_get_and_duplicate_table() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data")).unwrap();
        db.create_table(IndexType::BTree, "T1").unwrap();
        // Names are case-insensitive.
        let table = db.get_table("t1").unwrap();
        assert_eq!(table.name(), "t1");
        assert!(matches!(
            db.create_table(IndexType::Hash, "t1"),
            Err(Error::Duplicate)
        ));
    }

    #[test]
    fn test_tables_reopen_from_meta() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("data");
        {
            let db = Database::open(&base).unwrap();
            let bt = db.create_table(IndexType::BTree, "bt").unwrap();
            let hs = db.create_table(IndexType::Hash, "hs").unwrap();
            bt.insert(1, 11, false).unwrap();
            hs.insert(2, 22, false).unwrap();
            db.close().unwrap();
        }
        let db = Database::open(&base).unwrap();
        assert_eq!(db.get_table("bt").unwrap().find(1).unwrap().value, 11);
        assert_eq!(db.get_table("hs").unwrap().find(2).unwrap().value, 22);
        assert_eq!(db.get_tables().len(), 2);
    }

    #[test]
    fn test_drop_table_removes_files() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data")).unwrap();
        db.create_table(IndexType::Hash, "gone").unwrap();
        db.drop_table("gone").unwrap();
        assert!(db.get_table("gone").is_err());
        assert!(!dir.path().join("data").join("gone.hash").exists());
        assert!(!dir.path().join("data").join("gone.meta").exists());
    }
}
