//! Page frames: the in-memory unit handed out by the pager.

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::pager::Pager;
use crate::{PageNum, PAGE_SIZE};

/// A page-sized, page-aligned byte buffer. The alignment satisfies the
/// direct-I/O requirement that buffers start on a block boundary.
#[repr(align(4096))]
pub struct PageBuf(pub [u8; PAGE_SIZE]);

impl PageBuf {
    pub fn zeroed() -> Self {
        PageBuf([0; PAGE_SIZE])
    }
}

impl std::ops::Deref for PageBuf {
    type Target = [u8; PAGE_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for PageBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// One frame of the buffer pool. The payload latch serializes readers and
/// writers of the page bytes; the updates gate is a second barrier that
/// checkpoint closes while it flushes and shadow-copies the database.
/// List membership, page number and pin count live in the pager's frame
/// table, under the pager mutex.
pub(crate) struct Frame {
    pub(crate) buf: RwLock<PageBuf>,
    pub(crate) dirty: Mutex<bool>,
    updates_locked: Mutex<bool>,
    updates_cv: Condvar,
}

impl Frame {
    pub(crate) fn new() -> Self {
        Frame {
            buf: RwLock::new(PageBuf::zeroed()),
            dirty: Mutex::new(false),
            updates_locked: Mutex::new(false),
            updates_cv: Condvar::new(),
        }
    }

    pub(crate) fn lock_updates(&self) {
        *self.updates_locked.lock() = true;
    }

    pub(crate) fn unlock_updates(&self) {
        *self.updates_locked.lock() = false;
        self.updates_cv.notify_all();
    }

    fn wait_updates_unlocked(&self) {
        let mut locked = self.updates_locked.lock();
        while *locked {
            self.updates_cv.wait(&mut locked);
        }
    }

    fn updates_are_locked(&self) -> bool {
        *self.updates_locked.lock()
    }
}

/// An owned borrow of a pinned page. Dropping the handle unpins the frame
/// and, once the pin count reaches zero, requeues it at the tail of the
/// pager's unpinned list. Handles are the only way to reach page bytes.
pub struct PageHandle<'a> {
    pager: &'a Pager,
    frame: &'a Frame,
    frame_idx: usize,
    page_num: PageNum,
}

impl<'a> PageHandle<'a> {
    pub(crate) fn new(
        pager: &'a Pager,
        frame: &'a Frame,
        frame_idx: usize,
        page_num: PageNum,
    ) -> Self {
        PageHandle {
            pager,
            frame,
            frame_idx,
            page_num,
        }
    }

    pub fn page_num(&self) -> PageNum {
        self.page_num
    }

    /// Read-latch the page payload.
    pub fn read(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.frame.buf.read()
    }

    /// Write-latch the page payload and mark the frame dirty. Blocks while
    /// a checkpoint holds the updates gate; the gate is rechecked after the
    /// latch is acquired so a writer cannot slip in mid-checkpoint.
    pub fn write(&self) -> RwLockWriteGuard<'_, PageBuf> {
        loop {
            self.frame.wait_updates_unlocked();
            let guard = self.frame.buf.write();
            if self.frame.updates_are_locked() {
                drop(guard);
                continue;
            }
            *self.frame.dirty.lock() = true;
            return guard;
        }
    }
}

impl Drop for PageHandle<'_> {
    fn drop(&mut self) {
        self.pager.put(self.frame_idx, self.page_num);
    }
}
