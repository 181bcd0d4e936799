//! The shared index surface: a tagged variant over the two index kinds,
//! plus the `.meta` sidecar header that records each index's open state.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::btree::{BTreeCursor, BTreeIndex};
use crate::errors::{Error, Result};
use crate::hash::{HashCursor, HashIndex};
use crate::pager::Pager;
use crate::PageNum;

/// One record of a table: a 64-bit key and a 64-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    pub key: i64,
    pub value: i64,
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.key, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    BTree,
    Hash,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::BTree => "btree",
            IndexType::Hash => "hash",
        }
    }

    /// The index file extension for this kind.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn parse(s: &str) -> Result<IndexType> {
        match s {
            "btree" => Ok(IndexType::BTree),
            "hash" => Ok(IndexType::Hash),
            other => Err(Error::InvalidInput(format!("unknown index type {other}"))),
        }
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header persisted beside each index file as `<name>.meta`.
#[derive(Debug, Serialize, Deserialize)]
pub enum IndexMeta {
    BTree { root_pn: PageNum },
    Hash { global_depth: i64, bucket_pns: Vec<PageNum> },
}

impl IndexMeta {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<IndexMeta> {
        let bytes = std::fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

/// A table's index: either a B+-tree or an extendible hash table, behind
/// one surface.
pub enum Index {
    BTree(BTreeIndex),
    Hash(HashIndex),
}

impl Index {
    pub fn create(index_type: IndexType, pager: Arc<Pager>, name: String) -> Result<Index> {
        match index_type {
            IndexType::BTree => Ok(Index::BTree(BTreeIndex::create(pager, name)?)),
            IndexType::Hash => Ok(Index::Hash(HashIndex::create(pager, name)?)),
        }
    }

    pub fn open(pager: Arc<Pager>, name: String, meta: IndexMeta) -> Result<Index> {
        match meta {
            IndexMeta::BTree { root_pn } => {
                Ok(Index::BTree(BTreeIndex::open(pager, name, root_pn)?))
            }
            IndexMeta::Hash {
                global_depth,
                bucket_pns,
            } => Ok(Index::Hash(HashIndex::open(
                pager,
                name,
                global_depth,
                bucket_pns,
            )?)),
        }
    }

    pub fn index_type(&self) -> IndexType {
        match self {
            Index::BTree(_) => IndexType::BTree,
            Index::Hash(_) => IndexType::Hash,
        }
    }

    pub fn meta(&self) -> IndexMeta {
        match self {
            Index::BTree(t) => IndexMeta::BTree { root_pn: t.root_pn() },
            Index::Hash(t) => IndexMeta::Hash {
                global_depth: t.global_depth(),
                bucket_pns: t.bucket_pns(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Index::BTree(t) => t.name(),
            Index::Hash(t) => t.name(),
        }
    }

    pub fn pager(&self) -> &Arc<Pager> {
        match self {
            Index::BTree(t) => t.pager(),
            Index::Hash(t) => t.pager(),
        }
    }

    pub fn find(&self, key: i64) -> Result<Entry> {
        match self {
            Index::BTree(t) => t.find(key),
            Index::Hash(t) => t.find(key),
        }
    }

    /// Entries with `lo <= key < hi`. Hash tables have no key order to
    /// range over, so the range surface is B+-tree only.
    pub fn find_range(&self, lo: i64, hi: i64) -> Result<Vec<Entry>> {
        match self {
            Index::BTree(t) => t.find_range(lo, hi),
            Index::Hash(_) => Err(Error::InvalidInput(
                "range scans need a btree table".to_string(),
            )),
        }
    }

    pub fn insert(&self, key: i64, value: i64, update: bool) -> Result<()> {
        match self {
            Index::BTree(t) => t.insert(key, value, update),
            Index::Hash(t) => t.insert(key, value, update),
        }
    }

    pub fn update(&self, key: i64, value: i64) -> Result<()> {
        match self {
            Index::BTree(t) => t.update(key, value),
            Index::Hash(t) => t.update(key, value),
        }
    }

    pub fn delete(&self, key: i64) -> Result<()> {
        match self {
            Index::BTree(t) => t.delete(key),
            Index::Hash(t) => t.delete(key),
        }
    }

    pub fn select(&self) -> Result<Vec<Entry>> {
        match self {
            Index::BTree(t) => t.select(),
            Index::Hash(t) => t.select(),
        }
    }

    /// A cursor at the first entry of the table.
    pub fn table_start(&self) -> Result<TableCursor<'_>> {
        match self {
            Index::BTree(t) => Ok(TableCursor::BTree(t.cursor()?)),
            Index::Hash(t) => Ok(TableCursor::Hash(t.cursor()?)),
        }
    }

    pub fn print(&self, w: &mut dyn Write) -> Result<()> {
        match self {
            Index::BTree(t) => t.print(w),
            Index::Hash(t) => t.print(w),
        }
    }

    /// Block every operation on this index for the guard's lifetime.
    pub fn quiesce(&self) -> QuiesceGuard<'_> {
        QuiesceGuard {
            _guard: match self {
                Index::BTree(t) => QuiesceInner::BTree(t.quiesce()),
                Index::Hash(t) => QuiesceInner::Hash(t.quiesce()),
            },
        }
    }

    pub fn close(&self) -> Result<()> {
        match self {
            Index::BTree(t) => t.close(),
            Index::Hash(t) => t.close(),
        }
    }
}

/// Held by checkpoint while it flushes and shadow-copies.
pub struct QuiesceGuard<'a> {
    _guard: QuiesceInner<'a>,
}

enum QuiesceInner<'a> {
    BTree(parking_lot::RwLockWriteGuard<'a, ()>),
    Hash(parking_lot::RwLockWriteGuard<'a, crate::hash::Directory>),
}

/// A cursor over either index kind.
pub enum TableCursor<'a> {
    BTree(BTreeCursor<'a>),
    Hash(HashCursor<'a>),
}

impl TableCursor<'_> {
    /// Move ahead by one entry. Returns true at the end of the table.
    pub fn step_forward(&mut self) -> Result<bool> {
        match self {
            TableCursor::BTree(c) => c.step_forward(),
            TableCursor::Hash(c) => c.step_forward(),
        }
    }

    pub fn is_end(&self) -> bool {
        match self {
            TableCursor::BTree(c) => c.is_end(),
            TableCursor::Hash(c) => c.is_end(),
        }
    }

    pub fn get_entry(&self) -> Result<Entry> {
        match self {
            TableCursor::BTree(c) => c.get_entry(),
            TableCursor::Hash(c) => c.get_entry(),
        }
    }
}
