//! Extendible hash index over pager pages.
//!
//! A directory of `2^D` bucket page numbers routes each key by the low `D`
//! bits of a 64-bit mixing hash. Buckets carry their own local depth
//! `d <= D`; several directory slots may alias one bucket. A full bucket
//! splits by local depth, doubling the directory first when `d == D`.

use std::collections::HashSet;
use std::io::Write;
use std::mem::size_of;
use std::sync::Arc;

use crc::{Crc, CRC_64_ECMA_182};
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::errors::{Error, Result};
use crate::index::Entry;
use crate::page::PageBuf;
use crate::pager::Pager;
use crate::{PageNum, PAGE_SIZE};

const BUCKET_HEADER_SIZE: usize = size_of::<BucketHeader>();
const ENTRY_SIZE: usize = 16;

/// Buckets split upon reaching this count; one physical slot of headroom
/// absorbs the insert that triggers the split.
pub const BUCKET_SIZE: usize = (PAGE_SIZE - BUCKET_HEADER_SIZE) / ENTRY_SIZE - 1;

/// Fresh tables start with four buckets.
const INITIAL_DEPTH: i64 = 2;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// A 64-bit mix of `key`; the full-width hash behind `hasher` and the
/// query layer's bloom filter.
pub fn mix64(key: i64) -> u64 {
    CRC64.checksum(&key.to_le_bytes())
}

/// The low `depth` bits of a 64-bit mix of `key`.
pub fn hasher(key: i64, depth: i64) -> i64 {
    (mix64(key) & mask(depth)) as i64
}

fn mask(depth: i64) -> u64 {
    (1u64 << depth) - 1
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct BucketHeader {
    local_depth: i64,
    num_keys: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct BucketEntry {
    key: i64,
    value: i64,
}

impl PageBuf {
    fn bucket_header(&self) -> BucketHeader {
        unsafe { std::ptr::read_unaligned(self.0.as_ptr() as *const BucketHeader) }
    }

    fn set_bucket_header(&mut self, header: &BucketHeader) {
        unsafe {
            std::ptr::write_unaligned(self.0.as_mut_ptr() as *mut BucketHeader, *header);
        }
    }

    fn bucket_entry(&self, index: usize) -> BucketEntry {
        let offset = BUCKET_HEADER_SIZE + index * ENTRY_SIZE;
        unsafe { std::ptr::read_unaligned(self.0.as_ptr().add(offset) as *const BucketEntry) }
    }

    fn set_bucket_entry(&mut self, index: usize, entry: BucketEntry) {
        let offset = BUCKET_HEADER_SIZE + index * ENTRY_SIZE;
        unsafe {
            std::ptr::write_unaligned(
                self.0.as_mut_ptr().add(offset) as *mut BucketEntry,
                entry,
            );
        }
    }

    fn bucket_num_keys(&self) -> usize {
        self.bucket_header().num_keys as usize
    }

    fn set_bucket_num_keys(&mut self, num_keys: usize) {
        let mut header = self.bucket_header();
        header.num_keys = num_keys as i64;
        self.set_bucket_header(&header);
    }

    fn bucket_find(&self, key: i64) -> Option<usize> {
        (0..self.bucket_num_keys()).find(|&i| self.bucket_entry(i).key == key)
    }
}

/// The in-memory directory; persisted through the index's `.meta` sidecar.
pub struct Directory {
    global_depth: i64,
    bucket_pns: Vec<PageNum>,
}

impl Directory {
    /// Doubling the directory: every existing slot keeps its bucket and the
    /// upper half aliases the lower.
    fn extend(&mut self) {
        self.global_depth += 1;
        let doubled: Vec<PageNum> = self
            .bucket_pns
            .iter()
            .chain(self.bucket_pns.iter())
            .copied()
            .collect();
        self.bucket_pns = doubled;
    }
}

pub struct HashIndex {
    name: String,
    pager: Arc<Pager>,
    dir: RwLock<Directory>,
}

impl HashIndex {
    /// Initialize a fresh table with `2^INITIAL_DEPTH` buckets.
    pub fn create(pager: Arc<Pager>, name: String) -> Result<Self> {
        let mut bucket_pns = Vec::new();
        for _ in 0..(1 << INITIAL_DEPTH) {
            let page = pager.allocate_page()?;
            page.write().set_bucket_header(&BucketHeader {
                local_depth: INITIAL_DEPTH,
                num_keys: 0,
            });
            bucket_pns.push(page.page_num());
        }
        Ok(HashIndex {
            name,
            pager,
            dir: RwLock::new(Directory {
                global_depth: INITIAL_DEPTH,
                bucket_pns,
            }),
        })
    }

    /// Open an existing table from its persisted directory state.
    pub fn open(
        pager: Arc<Pager>,
        name: String,
        global_depth: i64,
        bucket_pns: Vec<PageNum>,
    ) -> Result<Self> {
        if pager.num_pages() == 0 {
            return Self::create(pager, name);
        }
        Ok(HashIndex {
            name,
            pager,
            dir: RwLock::new(Directory {
                global_depth,
                bucket_pns,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pager(&self) -> &Arc<Pager> {
        &self.pager
    }

    pub fn global_depth(&self) -> i64 {
        self.dir.read().global_depth
    }

    pub fn bucket_pns(&self) -> Vec<PageNum> {
        self.dir.read().bucket_pns.clone()
    }

    /// Double the directory without splitting any bucket. The join operator
    /// uses this to bring two partitions to a common depth.
    pub fn extend_directory(&self) {
        self.dir.write().extend();
    }

    /// Every entry of one bucket page.
    pub fn bucket_entries(&self, pn: PageNum) -> Result<Vec<Entry>> {
        let page = self.pager.get_page(pn)?;
        let buf = page.read();
        Ok((0..buf.bucket_num_keys())
            .map(|i| {
                let entry = buf.bucket_entry(i);
                Entry {
                    key: entry.key,
                    value: entry.value,
                }
            })
            .collect())
    }

    /// Block every table operation; used by checkpoint.
    pub fn quiesce(&self) -> RwLockWriteGuard<'_, Directory> {
        self.dir.write()
    }

    pub fn find(&self, key: i64) -> Result<Entry> {
        let dir = self.dir.read();
        let slot = hasher(key, dir.global_depth);
        let page = self.pager.get_page(dir.bucket_pns[slot as usize])?;
        let buf = page.read();
        match buf.bucket_find(key) {
            Some(i) => {
                let entry = buf.bucket_entry(i);
                Ok(Entry {
                    key: entry.key,
                    value: entry.value,
                })
            }
            None => Err(Error::NotFound),
        }
    }

    /// Insert `key`, splitting the target bucket as needed. With `update`
    /// set an existing key is overwritten in place.
    pub fn insert(&self, key: i64, value: i64, update: bool) -> Result<()> {
        let mut dir = self.dir.write();
        let slot = hasher(key, dir.global_depth);
        let pn = dir.bucket_pns[slot as usize];
        let needs_split = {
            let page = self.pager.get_page(pn)?;
            let mut buf = page.write();
            match buf.bucket_find(key) {
                Some(i) if update => {
                    buf.set_bucket_entry(i, BucketEntry { key, value });
                    return Ok(());
                }
                Some(_) => return Err(Error::Duplicate),
                None => {}
            }
            let num_keys = buf.bucket_num_keys();
            buf.set_bucket_entry(num_keys, BucketEntry { key, value });
            buf.set_bucket_num_keys(num_keys + 1);
            num_keys + 1 == BUCKET_SIZE
        };
        if needs_split {
            let local_depth = {
                let page = self.pager.get_page(pn)?;
                let depth = page.read().bucket_header().local_depth;
                depth
            };
            let low_bits = slot & mask(local_depth) as i64;
            self.split_bucket(&mut dir, pn, low_bits)?;
        }
        Ok(())
    }

    /// Split the bucket whose directory residue (mod `2^d`) is `h`. Entries
    /// whose `d+1`-bit hash equals `h + 2^d` move to a fresh bucket and the
    /// aliasing directory slots are rewritten. Recurses while either side
    /// still overflows.
    fn split_bucket(&self, dir: &mut Directory, pn: PageNum, h: i64) -> Result<()> {
        let page = self.pager.get_page(pn)?;
        let local_depth = page.read().bucket_header().local_depth;
        if local_depth == dir.global_depth {
            dir.extend();
        }
        let new_depth = local_depth + 1;
        let high = h + (1 << local_depth);

        let new_page = self.pager.allocate_page()?;
        let new_pn = new_page.page_num();
        let (old_overflows, new_overflows) = {
            let mut old_buf = page.write();
            let mut new_buf = new_page.write();
            new_buf.set_bucket_header(&BucketHeader {
                local_depth: new_depth,
                num_keys: 0,
            });

            let mut kept = 0usize;
            let mut moved = 0usize;
            for i in 0..old_buf.bucket_num_keys() {
                let entry = old_buf.bucket_entry(i);
                if hasher(entry.key, new_depth) == high {
                    new_buf.set_bucket_entry(moved, entry);
                    moved += 1;
                } else {
                    old_buf.set_bucket_entry(kept, entry);
                    kept += 1;
                }
            }
            old_buf.set_bucket_header(&BucketHeader {
                local_depth: new_depth,
                num_keys: kept as i64,
            });
            new_buf.set_bucket_num_keys(moved);
            (kept >= BUCKET_SIZE, moved >= BUCKET_SIZE)
        };

        let residue_mask = mask(new_depth) as i64;
        for slot in 0..dir.bucket_pns.len() {
            if slot as i64 & residue_mask == high {
                dir.bucket_pns[slot] = new_pn;
            }
        }

        // A lopsided hash distribution can leave one side still full.
        if old_overflows {
            self.split_bucket(dir, pn, h)?;
        }
        if new_overflows {
            self.split_bucket(dir, new_pn, high)?;
        }
        Ok(())
    }

    pub fn update(&self, key: i64, value: i64) -> Result<()> {
        let dir = self.dir.read();
        let slot = hasher(key, dir.global_depth);
        let page = self.pager.get_page(dir.bucket_pns[slot as usize])?;
        let mut buf = page.write();
        match buf.bucket_find(key) {
            Some(i) => {
                buf.set_bucket_entry(i, BucketEntry { key, value });
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    /// Remove `key` from its bucket. Buckets are never coalesced.
    pub fn delete(&self, key: i64) -> Result<()> {
        let dir = self.dir.read();
        let slot = hasher(key, dir.global_depth);
        let page = self.pager.get_page(dir.bucket_pns[slot as usize])?;
        let mut buf = page.write();
        let index = match buf.bucket_find(key) {
            Some(i) => i,
            None => return Err(Error::NotFound),
        };
        let num_keys = buf.bucket_num_keys();
        for i in index..num_keys - 1 {
            let entry = buf.bucket_entry(i + 1);
            buf.set_bucket_entry(i, entry);
        }
        buf.set_bucket_num_keys(num_keys - 1);
        Ok(())
    }

    /// Every entry in the table, visiting each resident bucket once.
    pub fn select(&self) -> Result<Vec<Entry>> {
        let dir = self.dir.read();
        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for &pn in &dir.bucket_pns {
            if !seen.insert(pn) {
                continue;
            }
            let page = self.pager.get_page(pn)?;
            let buf = page.read();
            for i in 0..buf.bucket_num_keys() {
                let entry = buf.bucket_entry(i);
                entries.push(Entry {
                    key: entry.key,
                    value: entry.value,
                });
            }
        }
        Ok(entries)
    }

    /// A cursor over the table in bucket-chain order.
    pub fn cursor(&self) -> Result<HashCursor<'_>> {
        let dir = self.dir.read();
        let mut seen = HashSet::new();
        let buckets: Vec<PageNum> = dir
            .bucket_pns
            .iter()
            .copied()
            .filter(|pn| seen.insert(*pn))
            .collect();
        drop(dir);
        let mut cursor = HashCursor {
            index: self,
            buckets,
            bucket: 0,
            cell: 0,
            at_end: false,
        };
        cursor.skip_empty_buckets()?;
        Ok(cursor)
    }

    /// Check that every entry hashes to the directory slot pointing at its
    /// bucket, under the bucket's local depth.
    pub fn is_consistent(&self) -> Result<bool> {
        let dir = self.dir.read();
        for (slot, &pn) in dir.bucket_pns.iter().enumerate() {
            let page = self.pager.get_page(pn)?;
            let buf = page.read();
            let local_depth = buf.bucket_header().local_depth;
            for i in 0..buf.bucket_num_keys() {
                let key = buf.bucket_entry(i).key;
                if hasher(key, local_depth) != slot as i64 & mask(local_depth) as i64 {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    pub fn print(&self, w: &mut dyn Write) -> Result<()> {
        let dir = self.dir.read();
        writeln!(w, "====")?;
        writeln!(w, "global depth: {}", dir.global_depth)?;
        for (slot, &pn) in dir.bucket_pns.iter().enumerate() {
            let page = self.pager.get_page(pn)?;
            let buf = page.read();
            writeln!(w, "====")?;
            writeln!(
                w,
                "bucket {slot} @ [{pn}] depth: {}",
                buf.bucket_header().local_depth
            )?;
            for i in 0..buf.bucket_num_keys() {
                let entry = buf.bucket_entry(i);
                writeln!(w, " |--> ({}, {})", entry.key, entry.value)?;
            }
        }
        writeln!(w, "====")?;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.pager.close()
    }
}

pub struct HashCursor<'a> {
    index: &'a HashIndex,
    buckets: Vec<PageNum>,
    bucket: usize,
    cell: usize,
    at_end: bool,
}

impl HashCursor<'_> {
    fn skip_empty_buckets(&mut self) -> Result<()> {
        loop {
            if self.bucket >= self.buckets.len() {
                self.at_end = true;
                return Ok(());
            }
            let num_keys = {
                let page = self.index.pager.get_page(self.buckets[self.bucket])?;
                let buf = page.read();
                buf.bucket_num_keys()
            };
            if self.cell < num_keys {
                return Ok(());
            }
            self.bucket += 1;
            self.cell = 0;
        }
    }

    /// Move ahead by one entry. Returns true at the end of the table.
    pub fn step_forward(&mut self) -> Result<bool> {
        if self.at_end {
            return Ok(true);
        }
        self.cell += 1;
        self.skip_empty_buckets()?;
        Ok(self.at_end)
    }

    pub fn is_end(&self) -> bool {
        self.at_end
    }

    pub fn get_entry(&self) -> Result<Entry> {
        if self.at_end {
            return Err(Error::NotFound);
        }
        let page = self.index.pager.get_page(self.buckets[self.bucket])?;
        let buf = page.read();
        let entry = buf.bucket_entry(self.cell);
        Ok(Entry {
            key: entry.key,
            value: entry.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_table() -> HashIndex {
        HashIndex::create(Arc::new(Pager::in_memory()), "h".to_string()).unwrap()
    }

    #[test]
    fn test_insert_find_update_delete() {
        let table = memory_table();
        table.insert(7, 70, false).unwrap();
        assert_eq!(table.find(7).unwrap(), Entry { key: 7, value: 70 });

        table.update(7, 71).unwrap();
        assert_eq!(table.find(7).unwrap().value, 71);

        table.delete(7).unwrap();
        assert!(matches!(table.find(7), Err(Error::NotFound)));
        assert!(matches!(table.update(7, 1), Err(Error::NotFound)));
        assert!(matches!(table.delete(7), Err(Error::NotFound)));
    }

    #[test]
    fn test_duplicate_insert_is_rejected_unless_update() {
        let table = memory_table();
        table.insert(3, 30, false).unwrap();
        assert!(matches!(table.insert(3, 31, false), Err(Error::Duplicate)));
        table.insert(3, 32, true).unwrap();
        assert_eq!(table.find(3).unwrap().value, 32);
    }

    #[test]
    fn test_splits_keep_every_entry_in_its_bucket() {
        let table = memory_table();
        let count = BUCKET_SIZE as i64 * 4 + 1;
        for key in 0..=count {
            table.insert(key, key * 10, false).unwrap();
            assert!(table.is_consistent().unwrap(), "after inserting {key}");
        }
        let entries: HashSet<i64> = table.select().unwrap().iter().map(|e| e.key).collect();
        assert_eq!(entries, (0..=count).collect::<HashSet<i64>>());
        for probe in [0, count / 2, count] {
            assert_eq!(table.find(probe).unwrap().value, probe * 10);
        }
    }

    #[test]
    fn test_directory_extension_grows_global_depth() {
        let table = memory_table();
        let before = table.global_depth();
        for key in 0..BUCKET_SIZE as i64 * 8 {
            table.insert(key, key, false).unwrap();
        }
        assert!(table.global_depth() > before);
        assert!(table.is_consistent().unwrap());
    }

    #[test]
    fn test_cursor_visits_every_entry_once() {
        let table = memory_table();
        for key in 0..500 {
            table.insert(key, key, false).unwrap();
        }
        let mut seen = HashSet::new();
        let mut cursor = table.cursor().unwrap();
        while !cursor.is_end() {
            assert!(seen.insert(cursor.get_entry().unwrap().key));
            if cursor.step_forward().unwrap() {
                break;
            }
        }
        assert_eq!(seen.len(), 500);
    }

    #[test]
    fn test_table_survives_reopen_with_directory_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.hash");
        let (depth, pns) = {
            let table =
                HashIndex::create(Arc::new(Pager::open(&path).unwrap()), "r".to_string()).unwrap();
            for key in 0..BUCKET_SIZE as i64 * 3 {
                table.insert(key, key + 5, false).unwrap();
            }
            let state = (table.global_depth(), table.bucket_pns());
            table.close().unwrap();
            state
        };
        let table = HashIndex::open(
            Arc::new(Pager::open(&path).unwrap()),
            "r".to_string(),
            depth,
            pns,
        )
        .unwrap();
        for key in [0, 77, BUCKET_SIZE as i64 * 3 - 1] {
            assert_eq!(table.find(key).unwrap().value, key + 5);
        }
        assert!(table.is_consistent().unwrap());
    }

    #[test]
    fn test_hasher_is_stable_and_depth_masked() {
        assert_eq!(hasher(42, 4), hasher(42, 4));
        for key in 0..1000 {
            let low = hasher(key, 3);
            assert!((0..8).contains(&low));
            assert_eq!(low, hasher(key, 5) & 0b111);
        }
    }
}
