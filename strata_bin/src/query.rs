//! Tangential query operators: a grace hash join and its bloom filter.
//!
//! Both tables are partitioned into temporary extendible hash indexes keyed
//! by the join column, the partitions are brought to a common directory
//! depth, and matching bucket pairs are probed with a bloom prefilter.

use std::sync::Arc;

use strata::hash::{mix64, HashIndex};
use strata::index::{Entry, Index};
use strata::pager::Pager;
use strata::Result;

const DEFAULT_FILTER_SIZE: u64 = 1024;

/// A fixed-size bloom filter over two independent hash families.
pub struct BloomFilter {
    size: u64,
    bits: Vec<u64>,
}

impl BloomFilter {
    pub fn new(size: u64) -> BloomFilter {
        BloomFilter {
            size,
            bits: vec![0; size.div_ceil(64) as usize],
        }
    }

    fn positions(&self, key: i64) -> (u64, u64) {
        let first = mix64(key) % self.size;
        let second = crc32fast::hash(&key.to_le_bytes()) as u64 % self.size;
        (first, second)
    }

    pub fn insert(&mut self, key: i64) {
        let (first, second) = self.positions(key);
        self.bits[(first / 64) as usize] |= 1 << (first % 64);
        self.bits[(second / 64) as usize] |= 1 << (second % 64);
    }

    pub fn contains(&self, key: i64) -> bool {
        let (first, second) = self.positions(key);
        self.bits[(first / 64) as usize] & (1 << (first % 64)) != 0
            && self.bits[(second / 64) as usize] & (1 << (second % 64)) != 0
    }
}

/// One joined row: the matching entries from each side, in their original
/// key/value orientation.
pub struct EntryPair {
    pub left: Entry,
    pub right: Entry,
}

/// A temporary partition: a hash index in a scratch directory that vanishes
/// with the join.
struct Partition {
    index: HashIndex,
    _dir: tempfile::TempDir,
}

/// Re-key one table into a temporary hash index on its join column. With
/// `on_key` false the entry is stored swapped, value first.
fn build_partition(table: &Index, on_key: bool) -> Result<Partition> {
    let dir = tempfile::tempdir()?;
    let pager = Arc::new(Pager::open(dir.path().join("partition.hash"))?);
    let index = HashIndex::create(pager, "partition".to_string())?;
    let mut cursor = table.table_start()?;
    while !cursor.is_end() {
        let entry = cursor.get_entry()?;
        if on_key {
            index.insert(entry.key, entry.value, true)?;
        } else {
            index.insert(entry.value, entry.key, true)?;
        }
        if cursor.step_forward()? {
            break;
        }
    }
    Ok(Partition { index, _dir: dir })
}

fn restore_orientation(entry: Entry, on_key: bool) -> Entry {
    if on_key {
        entry
    } else {
        Entry {
            key: entry.value,
            value: entry.key,
        }
    }
}

/// Grace hash join of `left` and `right` on the chosen columns (true =
/// key, false = value).
pub fn join(
    left: &Index,
    right: &Index,
    on_left_key: bool,
    on_right_key: bool,
) -> Result<Vec<EntryPair>> {
    let left_partition = build_partition(left, on_left_key)?;
    let right_partition = build_partition(right, on_right_key)?;

    // Equal directory depths make bucket pairing positional.
    while left_partition.index.global_depth() < right_partition.index.global_depth() {
        left_partition.index.extend_directory();
    }
    while right_partition.index.global_depth() < left_partition.index.global_depth() {
        right_partition.index.extend_directory();
    }

    let left_buckets = left_partition.index.bucket_pns();
    let right_buckets = right_partition.index.bucket_pns();
    let mut seen = std::collections::HashSet::new();
    let mut pairs = Vec::new();
    for (left_pn, right_pn) in left_buckets.into_iter().zip(right_buckets) {
        if !seen.insert((left_pn, right_pn)) {
            continue;
        }
        let left_entries = left_partition.index.bucket_entries(left_pn)?;
        let right_entries = right_partition.index.bucket_entries(right_pn)?;

        let mut filter = BloomFilter::new(DEFAULT_FILTER_SIZE);
        for entry in &right_entries {
            filter.insert(entry.key);
        }
        let by_join_key: std::collections::HashMap<i64, Entry> =
            right_entries.iter().map(|e| (e.key, *e)).collect();

        for entry in &left_entries {
            if !filter.contains(entry.key) {
                continue;
            }
            if let Some(&matching) = by_join_key.get(&entry.key) {
                pairs.push(EntryPair {
                    left: restore_orientation(*entry, on_left_key),
                    right: restore_orientation(matching, on_right_key),
                });
            }
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata::IndexType;

    #[test]
    fn test_bloom_filter_has_no_false_negatives() {
        let mut filter = BloomFilter::new(DEFAULT_FILTER_SIZE);
        for key in 0..200 {
            filter.insert(key * 7);
        }
        for key in 0..200 {
            assert!(filter.contains(key * 7));
        }
    }

    fn table_with(entries: &[(i64, i64)], index_type: IndexType) -> (Index, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pager = Arc::new(
            Pager::open(dir.path().join(format!("t.{}", index_type.extension()))).unwrap(),
        );
        let index = Index::create(index_type, pager, "t".to_string()).unwrap();
        for &(key, value) in entries {
            index.insert(key, value, false).unwrap();
        }
        (index, dir)
    }

    #[test]
    fn test_join_key_on_key() {
        let (left, _l) = table_with(&[(1, 10), (2, 20), (3, 30)], IndexType::BTree);
        let (right, _r) = table_with(&[(2, 200), (3, 300), (4, 400)], IndexType::Hash);
        let mut pairs = join(&left, &right, true, true).unwrap();
        pairs.sort_by_key(|p| p.left.key);
        let got: Vec<(i64, i64, i64, i64)> = pairs
            .iter()
            .map(|p| (p.left.key, p.left.value, p.right.key, p.right.value))
            .collect();
        assert_eq!(got, vec![(2, 20, 2, 200), (3, 30, 3, 300)]);
    }

    #[test]
    fn test_join_value_on_key_restores_orientation() {
        // left values join against right keys.
        let (left, _l) = table_with(&[(1, 5), (2, 6)], IndexType::BTree);
        let (right, _r) = table_with(&[(5, 50), (7, 70)], IndexType::BTree);
        let pairs = join(&left, &right, false, true).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].left.key, pairs[0].left.value), (1, 5));
        assert_eq!((pairs[0].right.key, pairs[0].right.value), (5, 50));
    }
}
