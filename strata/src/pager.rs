//! The pager: a fixed pool of page frames cached over a single file.
//!
//! Frames live in one `Vec` and move between three intrusive lists (free,
//! unpinned, pinned) linked through in-vector indices. The page table maps
//! page numbers to frame indices for exactly the frames on the pinned and
//! unpinned lists. Eviction takes the head of the unpinned list (LRU);
//! anything that finishes with a page requeues it at the unpinned tail.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use parking_lot::{Condvar, Mutex};

use crate::errors::{Error, Result};
use crate::page::{Frame, PageHandle};
use crate::{PageNum, MAX_PAGES, NO_PAGE, PAGE_SIZE};

const NO_FRAME: usize = usize::MAX;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ListId {
    Free = 0,
    Unpinned = 1,
    Pinned = 2,
}

struct FrameMeta {
    page_num: PageNum,
    pin_count: u32,
    prev: usize,
    next: usize,
    list: ListId,
}

#[derive(Clone, Copy)]
struct ListEnds {
    head: usize,
    tail: usize,
}

struct PoolState {
    meta: Vec<FrameMeta>,
    ends: [ListEnds; 3],
    page_table: HashMap<PageNum, usize>,
    max_page_num: PageNum,
    frozen: bool,
    closed: bool,
}

impl PoolState {
    fn new() -> Self {
        let mut state = PoolState {
            meta: Vec::with_capacity(MAX_PAGES),
            ends: [ListEnds {
                head: NO_FRAME,
                tail: NO_FRAME,
            }; 3],
            page_table: HashMap::new(),
            max_page_num: 0,
            frozen: false,
            closed: false,
        };
        for idx in 0..MAX_PAGES {
            state.meta.push(FrameMeta {
                page_num: NO_PAGE,
                pin_count: 0,
                prev: NO_FRAME,
                next: NO_FRAME,
                list: ListId::Free,
            });
            state.link_tail(ListId::Free, idx);
        }
        state
    }

    fn link_tail(&mut self, list: ListId, idx: usize) {
        let ends = &mut self.ends[list as usize];
        self.meta[idx].list = list;
        self.meta[idx].next = NO_FRAME;
        self.meta[idx].prev = ends.tail;
        if ends.tail != NO_FRAME {
            self.meta[ends.tail].next = idx;
        } else {
            ends.head = idx;
        }
        ends.tail = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next, list) = {
            let m = &self.meta[idx];
            (m.prev, m.next, m.list)
        };
        let ends = &mut self.ends[list as usize];
        if prev != NO_FRAME {
            self.meta[prev].next = next;
        } else {
            ends.head = next;
        }
        if next != NO_FRAME {
            self.meta[next].prev = prev;
        } else {
            ends.tail = prev;
        }
        self.meta[idx].prev = NO_FRAME;
        self.meta[idx].next = NO_FRAME;
    }

    fn head(&self, list: ListId) -> Option<usize> {
        match self.ends[list as usize].head {
            NO_FRAME => None,
            idx => Some(idx),
        }
    }

    fn pop_head(&mut self, list: ListId) -> Option<usize> {
        let idx = self.head(list)?;
        self.unlink(idx);
        Some(idx)
    }
}

/// Pagers manage pages of data read from a single file. A pager without a
/// file backs temporary indexes entirely in memory; such a pager never
/// evicts, so it fails with `NoFrames` once every frame is in use.
pub struct Pager {
    file: Option<std::fs::File>,
    path: Option<PathBuf>,
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    state_cv: Condvar,
}

impl Pager {
    /// Construct a pager with no backing file.
    pub fn in_memory() -> Self {
        Pager {
            file: None,
            path: None,
            frames: (0..MAX_PAGES).map(|_| Frame::new()).collect(),
            state: Mutex::new(PoolState::new()),
            state_cv: Condvar::new(),
        }
    }

    /// Open or create the file at `path`. Fails with `CorruptFile` if the
    /// existing file's size is not a whole multiple of the page size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        crate::strata_debug_log!("[Pager::open] opening index file at {path_ref:?}");
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(Error::CorruptFile(path_ref.display().to_string()));
        }
        let mut pager = Pager::in_memory();
        pager.state.get_mut().max_page_num = (len / PAGE_SIZE as u64) as PageNum;
        pager.file = Some(file);
        pager.path = Some(path_ref.to_path_buf());
        Ok(pager)
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The number of pages currently in the file (plus unflushed new pages).
    pub fn num_pages(&self) -> PageNum {
        self.state.lock().max_page_num
    }

    /// Returns the page pinned; the caller's handle is the pin token.
    pub fn get_page(&self, page_num: PageNum) -> Result<PageHandle<'_>> {
        if page_num < 0 {
            return Err(Error::InvalidPage(page_num));
        }
        let mut state = self.state.lock();
        while state.frozen {
            self.state_cv.wait(&mut state);
        }
        if state.closed {
            return Err(Error::InvalidInput("pager is closed".to_string()));
        }
        if let Some(&idx) = state.page_table.get(&page_num) {
            if state.meta[idx].list == ListId::Unpinned {
                state.unlink(idx);
                state.link_tail(ListId::Pinned, idx);
            }
            state.meta[idx].pin_count += 1;
            return Ok(PageHandle::new(self, &self.frames[idx], idx, page_num));
        }
        self.page_in(&mut state, page_num)
    }

    /// Materialize the first page number beyond the end of the file, pinned.
    pub fn allocate_page(&self) -> Result<PageHandle<'_>> {
        let mut state = self.state.lock();
        while state.frozen {
            self.state_cv.wait(&mut state);
        }
        if state.closed {
            return Err(Error::InvalidInput("pager is closed".to_string()));
        }
        let page_num = state.max_page_num;
        self.page_in(&mut state, page_num)
    }

    /// Table-miss path: claim a frame, fill it, and pin it. The pager mutex
    /// is held on entry.
    fn page_in(&self, state: &mut PoolState, page_num: PageNum) -> Result<PageHandle<'_>> {
        let idx = self.claim_frame(state)?;
        let frame = &self.frames[idx];
        if page_num < state.max_page_num {
            let filled = match &self.file {
                Some(file) => {
                    let mut buf = frame.buf.write();
                    file.read_exact_at(&mut buf.0, page_num as u64 * PAGE_SIZE as u64)
                }
                // A file-less pager keeps every page resident, so a miss
                // below max_page_num can only be a never-written page.
                None => {
                    frame.buf.write().0.fill(0);
                    Ok(())
                }
            };
            if let Err(err) = filled {
                state.meta[idx].page_num = NO_PAGE;
                state.link_tail(ListId::Free, idx);
                return Err(err.into());
            }
            *frame.dirty.lock() = false;
        } else {
            // A brand-new page: zero it and mark it dirty so it reaches the
            // disk even if the caller never writes to it.
            frame.buf.write().0.fill(0);
            *frame.dirty.lock() = true;
            state.max_page_num = page_num + 1;
        }
        state.meta[idx].page_num = page_num;
        state.meta[idx].pin_count = 1;
        state.link_tail(ListId::Pinned, idx);
        state.page_table.insert(page_num, idx);
        Ok(PageHandle::new(self, frame, idx, page_num))
    }

    /// Take a frame off the free list, or evict the LRU unpinned frame.
    fn claim_frame(&self, state: &mut PoolState) -> Result<usize> {
        if let Some(idx) = state.pop_head(ListId::Free) {
            return Ok(idx);
        }
        if self.has_file() {
            if let Some(idx) = state.pop_head(ListId::Unpinned) {
                let old_page_num = state.meta[idx].page_num;
                self.flush_frame(idx, old_page_num)?;
                state.page_table.remove(&old_page_num);
                crate::strata_debug_log!("[Pager] evicted page {old_page_num} from frame {idx}");
                return Ok(idx);
            }
        }
        Err(Error::NoFrames)
    }

    /// Write a dirty frame's payload at its page offset. No fsync here: the
    /// write-ahead log is the durability boundary.
    fn flush_frame(&self, idx: usize, page_num: PageNum) -> Result<()> {
        let file = match &self.file {
            Some(file) => file,
            None => return Ok(()),
        };
        let frame = &self.frames[idx];
        let mut dirty = frame.dirty.lock();
        if *dirty {
            let buf = frame.buf.read();
            file.write_all_at(&buf.0, page_num as u64 * PAGE_SIZE as u64)?;
            *dirty = false;
        }
        Ok(())
    }

    /// Called from `PageHandle::drop`.
    pub(crate) fn put(&self, idx: usize, _page_num: PageNum) {
        let mut state = self.state.lock();
        state.meta[idx].pin_count -= 1;
        if state.meta[idx].pin_count == 0 {
            state.unlink(idx);
            state.link_tail(ListId::Unpinned, idx);
        }
    }

    pub fn flush_page(&self, page_num: PageNum) -> Result<()> {
        let state = self.state.lock();
        if let Some(&idx) = state.page_table.get(&page_num) {
            self.flush_frame(idx, page_num)?;
        }
        Ok(())
    }

    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();
        let resident: Vec<(usize, PageNum)> = state
            .page_table
            .iter()
            .map(|(&pn, &idx)| (idx, pn))
            .collect();
        for (idx, page_num) in resident {
            self.flush_frame(idx, page_num)?;
        }
        Ok(())
    }

    /// Flush everything and refuse further page-ins. A frame still pinned
    /// here is a logic error in the caller; we report it and proceed.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.head(ListId::Pinned).is_some() {
            eprintln!("strata: pages are still pinned on close");
        }
        let resident: Vec<(usize, PageNum)> = state
            .page_table
            .iter()
            .map(|(&pn, &idx)| (idx, pn))
            .collect();
        for (idx, page_num) in resident {
            self.flush_frame(idx, page_num)?;
        }
        state.closed = true;
        if let Some(file) = &self.file {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Close the checkpoint gate: resident frames refuse payload writes and
    /// the pool refuses page-ins until `unlock_all_updates`.
    pub fn lock_all_updates(&self) {
        let mut state = self.state.lock();
        state.frozen = true;
        for &idx in state.page_table.values() {
            self.frames[idx].lock_updates();
        }
    }

    /// Reopen the gate. Cleared on every frame, not just resident ones, so
    /// a frame recycled mid-checkpoint cannot keep its gate stuck.
    pub fn unlock_all_updates(&self) {
        let mut state = self.state.lock();
        state.frozen = false;
        for frame in &self.frames {
            frame.unlock_updates();
        }
        self.state_cv.notify_all();
    }
}
