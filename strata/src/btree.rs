//! Disk B+-tree index over pager pages.
//!
//! All data lives in leaf nodes; internal nodes are pure routing. Leaves are
//! linked left-to-right through a right-sibling page number. The root page
//! number never changes: when the root splits, its contents move to a fresh
//! page and the root page is rebuilt as an internal node over the two halves.

use std::io::Write;
use std::mem::size_of;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::{Error, Result};
use crate::index::Entry;
use crate::page::PageBuf;
use crate::pager::Pager;
use crate::{PageNum, NO_PAGE, PAGE_SIZE};

const LEAF_NODE: u8 = 1;
const INTERNAL_NODE: u8 = 2;

const NODE_HEADER_SIZE: usize = size_of::<NodeHeader>();
const CELL_SIZE: usize = 16;

/// Leaves split upon reaching this count; one physical slot of headroom
/// absorbs the insert that triggers the split.
pub const ENTRIES_PER_LEAF_NODE: usize = (PAGE_SIZE - NODE_HEADER_SIZE) / CELL_SIZE - 1;
/// Internal nodes split upon reaching this count of routing keys.
pub const KEYS_PER_INTERNAL_NODE: usize =
    (PAGE_SIZE - NODE_HEADER_SIZE - size_of::<PageNum>()) / CELL_SIZE - 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NodeHeader {
    node_type: u8,
    num_keys: u16,
    right_sibling: PageNum,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct LeafCell {
    key: i64,
    value: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct InternalCell {
    key: i64,
    child: PageNum,
}

impl PageBuf {
    fn node_header(&self) -> NodeHeader {
        unsafe { std::ptr::read_unaligned(self.0.as_ptr() as *const NodeHeader) }
    }

    fn set_node_header(&mut self, header: &NodeHeader) {
        unsafe {
            std::ptr::write_unaligned(self.0.as_mut_ptr() as *mut NodeHeader, *header);
        }
    }

    fn init_leaf(&mut self) {
        self.set_node_header(&NodeHeader {
            node_type: LEAF_NODE,
            num_keys: 0,
            right_sibling: NO_PAGE,
        });
    }

    fn init_internal(&mut self) {
        self.set_node_header(&NodeHeader {
            node_type: INTERNAL_NODE,
            num_keys: 0,
            right_sibling: NO_PAGE,
        });
    }

    fn num_keys(&self) -> usize {
        self.node_header().num_keys as usize
    }

    fn set_num_keys(&mut self, num_keys: usize) {
        let mut header = self.node_header();
        header.num_keys = num_keys as u16;
        self.set_node_header(&header);
    }

    fn leaf_cell(&self, index: usize) -> LeafCell {
        let offset = NODE_HEADER_SIZE + index * CELL_SIZE;
        unsafe { std::ptr::read_unaligned(self.0.as_ptr().add(offset) as *const LeafCell) }
    }

    fn set_leaf_cell(&mut self, index: usize, cell: LeafCell) {
        let offset = NODE_HEADER_SIZE + index * CELL_SIZE;
        unsafe {
            std::ptr::write_unaligned(self.0.as_mut_ptr().add(offset) as *mut LeafCell, cell);
        }
    }

    fn internal_cell(&self, index: usize) -> InternalCell {
        let offset = NODE_HEADER_SIZE + size_of::<PageNum>() + index * CELL_SIZE;
        unsafe { std::ptr::read_unaligned(self.0.as_ptr().add(offset) as *const InternalCell) }
    }

    fn set_internal_cell(&mut self, index: usize, cell: InternalCell) {
        let offset = NODE_HEADER_SIZE + size_of::<PageNum>() + index * CELL_SIZE;
        unsafe {
            std::ptr::write_unaligned(
                self.0.as_mut_ptr().add(offset) as *mut InternalCell,
                cell,
            );
        }
    }

    fn leftmost_child(&self) -> PageNum {
        unsafe {
            std::ptr::read_unaligned(self.0.as_ptr().add(NODE_HEADER_SIZE) as *const PageNum)
        }
    }

    fn set_leftmost_child(&mut self, child: PageNum) {
        unsafe {
            std::ptr::write_unaligned(
                self.0.as_mut_ptr().add(NODE_HEADER_SIZE) as *mut PageNum,
                child,
            );
        }
    }

    /// Child page number at position `index`, 0 ..= num_keys.
    fn child_at(&self, index: usize) -> PageNum {
        if index == 0 {
            self.leftmost_child()
        } else {
            self.internal_cell(index - 1).child
        }
    }
}

/// First index whose key is >= the target; num_keys if none is.
fn leaf_search(buf: &PageBuf, key: i64) -> usize {
    let mut low = 0;
    let mut high = buf.num_keys();
    while low < high {
        let mid = low + (high - low) / 2;
        if buf.leaf_cell(mid).key < key {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

/// First index whose routing key is > the target; num_keys if none is.
/// The result doubles as the child position to descend into.
fn internal_search(buf: &PageBuf, key: i64) -> usize {
    let mut low = 0;
    let mut high = buf.num_keys();
    while low < high {
        let mid = low + (high - low) / 2;
        if buf.internal_cell(mid).key <= key {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

/// A key promoted out of a split together with the new right node.
struct SplitEntry {
    key: i64,
    right_pn: PageNum,
}

pub struct BTreeIndex {
    name: String,
    pager: Arc<Pager>,
    root_pn: PageNum,
    // Structure latch: splits hold it exclusively, everything else shared.
    latch: RwLock<()>,
}

impl BTreeIndex {
    /// Initialize a fresh tree: the root is a leaf at page 0.
    pub fn create(pager: Arc<Pager>, name: String) -> Result<Self> {
        {
            let root = pager.allocate_page()?;
            root.write().init_leaf();
        }
        Ok(BTreeIndex {
            name,
            pager,
            root_pn: 0,
            latch: RwLock::new(()),
        })
    }

    /// Open an existing tree whose root lives at `root_pn`.
    pub fn open(pager: Arc<Pager>, name: String, root_pn: PageNum) -> Result<Self> {
        if pager.num_pages() == 0 {
            return Self::create(pager, name);
        }
        Ok(BTreeIndex {
            name,
            pager,
            root_pn,
            latch: RwLock::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pager(&self) -> &Arc<Pager> {
        &self.pager
    }

    pub fn root_pn(&self) -> PageNum {
        self.root_pn
    }

    /// Block every tree operation; used by checkpoint.
    pub fn quiesce(&self) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.latch.write()
    }

    /// Walk to the leaf that owns `key` and return its page number.
    fn leaf_for(&self, key: i64) -> Result<PageNum> {
        let mut current = self.root_pn;
        loop {
            let page = self.pager.get_page(current)?;
            let buf = page.read();
            let header = buf.node_header();
            if header.node_type == LEAF_NODE {
                return Ok(current);
            }
            current = buf.child_at(internal_search(&buf, key));
        }
    }

    pub fn find(&self, key: i64) -> Result<Entry> {
        let _guard = self.latch.read();
        let leaf_pn = self.leaf_for(key)?;
        let page = self.pager.get_page(leaf_pn)?;
        let buf = page.read();
        let index = leaf_search(&buf, key);
        if index < buf.num_keys() {
            let cell = buf.leaf_cell(index);
            if cell.key == key {
                return Ok(Entry {
                    key: cell.key,
                    value: cell.value,
                });
            }
        }
        Err(Error::NotFound)
    }

    /// Insert `key`. With `update` set an existing key is overwritten in
    /// place; without it a duplicate fails.
    pub fn insert(&self, key: i64, value: i64, update: bool) -> Result<()> {
        let _guard = self.latch.write();
        if let Some(split) = self.insert_into(self.root_pn, key, value, update)? {
            self.grow_root(split)?;
        }
        Ok(())
    }

    pub fn update(&self, key: i64, value: i64) -> Result<()> {
        let _guard = self.latch.read();
        let leaf_pn = self.leaf_for(key)?;
        let page = self.pager.get_page(leaf_pn)?;
        let mut buf = page.write();
        let index = leaf_search(&buf, key);
        if index < buf.num_keys() && buf.leaf_cell(index).key == key {
            buf.set_leaf_cell(index, LeafCell { key, value });
            return Ok(());
        }
        Err(Error::NotFound)
    }

    /// Remove `key` from its leaf. Never coalesces or rebalances; a heavily
    /// deleted tree degrades to a chain of sparse leaves.
    pub fn delete(&self, key: i64) -> Result<()> {
        let _guard = self.latch.read();
        let leaf_pn = self.leaf_for(key)?;
        let page = self.pager.get_page(leaf_pn)?;
        let mut buf = page.write();
        let index = leaf_search(&buf, key);
        let num_keys = buf.num_keys();
        if index >= num_keys || buf.leaf_cell(index).key != key {
            return Err(Error::NotFound);
        }
        for i in index..num_keys - 1 {
            let cell = buf.leaf_cell(i + 1);
            buf.set_leaf_cell(i, cell);
        }
        buf.set_num_keys(num_keys - 1);
        Ok(())
    }

    fn insert_into(
        &self,
        pn: PageNum,
        key: i64,
        value: i64,
        update: bool,
    ) -> Result<Option<SplitEntry>> {
        let page = self.pager.get_page(pn)?;
        let node_type = page.read().node_header().node_type;
        if node_type == LEAF_NODE {
            let mut buf = page.write();
            let index = leaf_search(&buf, key);
            let num_keys = buf.num_keys();
            if index < num_keys && buf.leaf_cell(index).key == key {
                if !update {
                    return Err(Error::Duplicate);
                }
                buf.set_leaf_cell(index, LeafCell { key, value });
                return Ok(None);
            }
            for i in (index..num_keys).rev() {
                let cell = buf.leaf_cell(i);
                buf.set_leaf_cell(i + 1, cell);
            }
            buf.set_leaf_cell(index, LeafCell { key, value });
            buf.set_num_keys(num_keys + 1);
            if num_keys + 1 == ENTRIES_PER_LEAF_NODE {
                return Ok(Some(self.split_leaf(&mut buf)?));
            }
            Ok(None)
        } else {
            let child_pn = {
                let buf = page.read();
                buf.child_at(internal_search(&buf, key))
            };
            let promoted = self.insert_into(child_pn, key, value, update)?;
            let entry = match promoted {
                Some(entry) => entry,
                None => return Ok(None),
            };
            let mut buf = page.write();
            let index = internal_search(&buf, entry.key);
            let num_keys = buf.num_keys();
            for i in (index..num_keys).rev() {
                let cell = buf.internal_cell(i);
                buf.set_internal_cell(i + 1, cell);
            }
            buf.set_internal_cell(
                index,
                InternalCell {
                    key: entry.key,
                    child: entry.right_pn,
                },
            );
            buf.set_num_keys(num_keys + 1);
            if num_keys + 1 == KEYS_PER_INTERNAL_NODE {
                return Ok(Some(self.split_internal(&mut buf)?));
            }
            Ok(None)
        }
    }

    /// Split a full leaf: the upper half moves to a fresh right sibling and
    /// the sibling's first key is promoted.
    fn split_leaf(&self, left: &mut PageBuf) -> Result<SplitEntry> {
        let right_page = self.pager.allocate_page()?;
        let mut right = right_page.write();
        right.init_leaf();

        let num_keys = left.num_keys();
        let median = num_keys / 2;
        for i in median..num_keys {
            let cell = left.leaf_cell(i);
            right.set_leaf_cell(i - median, cell);
        }
        right.set_num_keys(num_keys - median);
        left.set_num_keys(median);

        let mut right_header = right.node_header();
        right_header.right_sibling = left.node_header().right_sibling;
        right.set_node_header(&right_header);
        let mut left_header = left.node_header();
        left_header.right_sibling = right_page.page_num();
        left.set_node_header(&left_header);

        Ok(SplitEntry {
            key: right.leaf_cell(0).key,
            right_pn: right_page.page_num(),
        })
    }

    /// Split a full internal node at the median, promoting the median key.
    fn split_internal(&self, left: &mut PageBuf) -> Result<SplitEntry> {
        let right_page = self.pager.allocate_page()?;
        let mut right = right_page.write();
        right.init_internal();

        let num_keys = left.num_keys();
        let median = num_keys / 2;
        let promoted = left.internal_cell(median).key;

        right.set_leftmost_child(left.internal_cell(median).child);
        for i in median + 1..num_keys {
            let cell = left.internal_cell(i);
            right.set_internal_cell(i - median - 1, cell);
        }
        right.set_num_keys(num_keys - median - 1);
        left.set_num_keys(median);

        Ok(SplitEntry {
            key: promoted,
            right_pn: right_page.page_num(),
        })
    }

    /// A split reached the root. Move the root's (left-half) contents to a
    /// fresh page and rebuild the root page as an internal node over the
    /// two halves, keeping the root page number fixed.
    fn grow_root(&self, entry: SplitEntry) -> Result<()> {
        let root = self.pager.get_page(self.root_pn)?;
        let moved = self.pager.allocate_page()?;
        {
            let root_buf = root.read();
            let mut moved_buf = moved.write();
            moved_buf.0.copy_from_slice(&root_buf.0);
        }
        let mut root_buf = root.write();
        root_buf.init_internal();
        root_buf.set_leftmost_child(moved.page_num());
        root_buf.set_internal_cell(
            0,
            InternalCell {
                key: entry.key,
                child: entry.right_pn,
            },
        );
        root_buf.set_num_keys(1);
        Ok(())
    }

    /// All entries with `lo <= key < hi`, in key order.
    pub fn find_range(&self, lo: i64, hi: i64) -> Result<Vec<Entry>> {
        let _guard = self.latch.read();
        let mut entries = Vec::new();
        let leaf_pn = self.leaf_for(lo)?;
        let mut cursor = BTreeCursor::at(self, leaf_pn, lo)?;
        while !cursor.is_end() {
            let entry = cursor.get_entry()?;
            if entry.key >= hi {
                break;
            }
            entries.push(entry);
            if cursor.step_forward()? {
                break;
            }
        }
        Ok(entries)
    }

    pub fn select(&self) -> Result<Vec<Entry>> {
        let _guard = self.latch.read();
        let mut entries = Vec::new();
        let mut cursor = self.cursor()?;
        while !cursor.is_end() {
            entries.push(cursor.get_entry()?);
            if cursor.step_forward()? {
                break;
            }
        }
        Ok(entries)
    }

    /// A cursor at the first entry of the table.
    pub fn cursor(&self) -> Result<BTreeCursor<'_>> {
        let mut current = self.root_pn;
        loop {
            let page = self.pager.get_page(current)?;
            let buf = page.read();
            if buf.node_header().node_type == LEAF_NODE {
                break;
            }
            current = buf.leftmost_child();
        }
        let mut cursor = BTreeCursor {
            index: self,
            leaf_pn: current,
            cell: 0,
            at_end: false,
        };
        cursor.skip_empty_leaves()?;
        Ok(cursor)
    }

    /// Pretty-print the tree rooted at `pn`.
    pub fn print(&self, w: &mut dyn Write) -> Result<()> {
        let _guard = self.latch.read();
        self.print_node(w, self.root_pn, "", "")
    }

    fn print_node(
        &self,
        w: &mut dyn Write,
        pn: PageNum,
        first_prefix: &str,
        prefix: &str,
    ) -> Result<()> {
        let page = self.pager.get_page(pn)?;
        let buf = page.read();
        let header = buf.node_header();
        let root_tag = if pn == self.root_pn { " (root)" } else { "" };
        if header.node_type == LEAF_NODE {
            writeln!(
                w,
                "{first_prefix}[{pn}] Leaf{root_tag} size: {}",
                header.num_keys
            )?;
            for i in 0..buf.num_keys() {
                let cell = buf.leaf_cell(i);
                writeln!(w, "{prefix} |--> ({}, {})", cell.key, cell.value)?;
            }
            if header.right_sibling != NO_PAGE {
                writeln!(w, "{prefix} |--+ right sibling @ [{}]", header.right_sibling)?;
            }
        } else {
            writeln!(
                w,
                "{first_prefix}[{pn}] Internal{root_tag} size: {}",
                header.num_keys as usize + 1
            )?;
            let child_prefix = format!("{prefix} |    ");
            for i in 0..=buf.num_keys() {
                let child = buf.child_at(i);
                self.print_node(w, child, &format!("{prefix} |--> "), &child_prefix)?;
                if i != buf.num_keys() {
                    writeln!(w, "{prefix} [KEY] {}", buf.internal_cell(i).key)?;
                }
            }
        }
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.pager.close()
    }
}

/// A location in the tree: a leaf page and a cell within it. Stepping off
/// the end of a leaf follows the right sibling, skipping empty leaves.
pub struct BTreeCursor<'a> {
    index: &'a BTreeIndex,
    leaf_pn: PageNum,
    cell: usize,
    at_end: bool,
}

impl<'a> BTreeCursor<'a> {
    /// A cursor positioned at the first entry with key >= `key`.
    fn at(index: &'a BTreeIndex, leaf_pn: PageNum, key: i64) -> Result<Self> {
        let cell = {
            let page = index.pager.get_page(leaf_pn)?;
            let buf = page.read();
            leaf_search(&buf, key)
        };
        let mut cursor = BTreeCursor {
            index,
            leaf_pn,
            cell,
            at_end: false,
        };
        cursor.skip_empty_leaves()?;
        Ok(cursor)
    }

    /// If the cursor sits at or past the end of its leaf, advance to the
    /// first entry of the next non-empty sibling.
    fn skip_empty_leaves(&mut self) -> Result<()> {
        loop {
            let (num_keys, right_sibling) = {
                let page = self.index.pager.get_page(self.leaf_pn)?;
                let buf = page.read();
                (buf.num_keys(), buf.node_header().right_sibling)
            };
            if self.cell < num_keys {
                return Ok(());
            }
            if right_sibling == NO_PAGE {
                self.at_end = true;
                return Ok(());
            }
            self.leaf_pn = right_sibling;
            self.cell = 0;
        }
    }

    /// Move ahead by one entry. Returns true at the end of the table.
    pub fn step_forward(&mut self) -> Result<bool> {
        if self.at_end {
            return Ok(true);
        }
        self.cell += 1;
        self.skip_empty_leaves()?;
        Ok(self.at_end)
    }

    pub fn is_end(&self) -> bool {
        self.at_end
    }

    pub fn get_entry(&self) -> Result<Entry> {
        if self.at_end {
            return Err(Error::NotFound);
        }
        let page = self.index.pager.get_page(self.leaf_pn)?;
        let buf = page.read();
        let cell = buf.leaf_cell(self.cell);
        Ok(Entry {
            key: cell.key,
            value: cell.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use tempfile::tempdir;

    fn memory_tree() -> BTreeIndex {
        BTreeIndex::create(Arc::new(Pager::in_memory()), "t".to_string()).unwrap()
    }

    #[test]
    fn test_insert_find_delete_round_trip() {
        let tree = memory_tree();
        tree.insert(1, 10, false).unwrap();
        tree.insert(2, 20, false).unwrap();
        tree.insert(3, 30, false).unwrap();

        assert_eq!(tree.find(2).unwrap(), Entry { key: 2, value: 20 });
        tree.delete(2).unwrap();
        assert!(matches!(tree.find(2), Err(Error::NotFound)));
        assert_eq!(
            tree.select().unwrap(),
            vec![Entry { key: 1, value: 10 }, Entry { key: 3, value: 30 }]
        );
    }

    #[test]
    fn test_duplicate_insert_is_rejected_unless_update() {
        let tree = memory_tree();
        tree.insert(5, 50, false).unwrap();
        assert!(matches!(tree.insert(5, 51, false), Err(Error::Duplicate)));
        tree.insert(5, 52, true).unwrap();
        assert_eq!(tree.find(5).unwrap().value, 52);
    }

    #[test]
    fn test_update_and_delete_missing_key() {
        let tree = memory_tree();
        assert!(matches!(tree.update(9, 1), Err(Error::NotFound)));
        assert!(matches!(tree.delete(9), Err(Error::NotFound)));
    }

    #[test]
    fn test_leaf_splits_keep_order_and_siblings() {
        let tree = memory_tree();
        let count = ENTRIES_PER_LEAF_NODE as i64 * 5;
        let mut keys: Vec<i64> = (0..count).collect();
        keys.shuffle(&mut rand::thread_rng());
        for &k in &keys {
            tree.insert(k, k * 2, false).unwrap();
        }

        let entries = tree.select().unwrap();
        assert_eq!(entries.len(), count as usize);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.key, i as i64);
            assert_eq!(entry.value, i as i64 * 2);
        }

        // Walk the leaf chain: each leaf's max key must be below its right
        // sibling's min key.
        let mut pn = tree.root_pn();
        loop {
            let page = tree.pager().get_page(pn).unwrap();
            let buf = page.read();
            if buf.node_header().node_type == LEAF_NODE {
                break;
            }
            pn = buf.leftmost_child();
        }
        loop {
            let page = tree.pager().get_page(pn).unwrap();
            let buf = page.read();
            let header = buf.node_header();
            if header.right_sibling == NO_PAGE {
                break;
            }
            let max_key = buf.leaf_cell(buf.num_keys() - 1).key;
            let sibling = tree.pager().get_page(header.right_sibling).unwrap();
            let sibling_buf = sibling.read();
            assert!(sibling_buf.num_keys() > 0);
            assert!(max_key < sibling_buf.leaf_cell(0).key);
            pn = header.right_sibling;
        }
    }

    #[test]
    fn test_range_scan_is_half_open() {
        let tree = memory_tree();
        for k in 0..600 {
            tree.insert(k, k, false).unwrap();
        }
        let entries = tree.find_range(100, 110).unwrap();
        let keys: Vec<i64> = entries.iter().map(|e| e.key).collect();
        assert_eq!(keys, (100..110).collect::<Vec<i64>>());
    }

    #[test]
    fn test_cursor_skips_emptied_leaves() {
        let tree = memory_tree();
        let count = ENTRIES_PER_LEAF_NODE as i64 * 3;
        for k in 0..count {
            tree.insert(k, k, false).unwrap();
        }
        // Empty out the middle stretch of the key space.
        for k in ENTRIES_PER_LEAF_NODE as i64 / 2..count - ENTRIES_PER_LEAF_NODE as i64 / 2 {
            tree.delete(k).unwrap();
        }
        let entries = tree.select().unwrap();
        assert_eq!(entries.len(), ENTRIES_PER_LEAF_NODE);
        for window in entries.windows(2) {
            assert!(window[0].key < window[1].key);
        }
    }

    #[test]
    fn test_root_split_preserves_root_page_number() {
        let tree = memory_tree();
        for k in 0..ENTRIES_PER_LEAF_NODE as i64 + 1 {
            tree.insert(k, k, false).unwrap();
        }
        let root = tree.pager().get_page(tree.root_pn()).unwrap();
        assert_eq!(root.read().node_header().node_type, INTERNAL_NODE);
        drop(root);
        assert_eq!(tree.find(0).unwrap().value, 0);
    }

    #[test]
    fn test_deep_tree_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep.btree");
        let tree =
            BTreeIndex::create(Arc::new(Pager::open(&path).unwrap()), "deep".to_string()).unwrap();

        let count = (KEYS_PER_INTERNAL_NODE as i64 + 4) * ENTRIES_PER_LEAF_NODE as i64 / 2;
        for k in 0..count {
            tree.insert(k, -k, false).unwrap();
        }
        for probe in [0, 1, count / 2, count - 1] {
            assert_eq!(tree.find(probe).unwrap().value, -probe);
        }
        assert!(matches!(tree.find(count), Err(Error::NotFound)));
    }

    #[test]
    fn test_tree_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.btree");
        {
            let tree = BTreeIndex::create(Arc::new(Pager::open(&path).unwrap()), "r".to_string())
                .unwrap();
            for k in 0..1000 {
                tree.insert(k, k + 1, false).unwrap();
            }
            tree.close().unwrap();
        }
        let tree =
            BTreeIndex::open(Arc::new(Pager::open(&path).unwrap()), "r".to_string(), 0).unwrap();
        for k in [0, 500, 999] {
            assert_eq!(tree.find(k).unwrap().value, k + 1);
        }
    }
}
