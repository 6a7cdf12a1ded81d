use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// A pinned reference to a resident page.
///
/// The pool hands one out with the pin already taken; the frame cannot be
/// evicted while the handle's pin is outstanding. Dropping the handle does
/// NOT unpin: callers pair it with an explicit
/// [`unpin_page`](super::BufferPoolManager::unpin_page), or use the RAII
/// guards below instead.
pub struct PageHandle {
    frame: Arc<FrameHeader>,
}

impl PageHandle {
    pub(crate) fn new(frame: Arc<FrameHeader>) -> Self {
        Self { frame }
    }

    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    pub fn pin_count(&self) -> u32 {
        self.frame.pin_count()
    }

    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }

    /// Shared access to the page bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Exclusive access to the page bytes. Mutating through this does not
    /// set the dirty flag; report dirtiness when unpinning.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.write_data()
    }

    pub(crate) fn frame(&self) -> &Arc<FrameHeader> {
        &self.frame
    }
}

/// Invoked when a guard drops: unpins the page, reporting whether the guard
/// dirtied it.
type ReleaseFn = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

struct GuardCore {
    page_id: PageId,
    /// Keeps the frame, and with it the borrowed data lock, alive.
    _frame: Arc<FrameHeader>,
    release: Option<ReleaseFn>,
    dirtied: bool,
}

impl GuardCore {
    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.page_id, self.dirtied);
        }
    }
}

/// RAII shared access to a page. Holds the frame's data lock in read mode
/// and unpins the page when dropped.
pub struct ReadPageGuard {
    core: GuardCore,
    data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>,
}

impl ReadPageGuard {
    pub(crate) fn new(handle: PageHandle, release: ReleaseFn) -> Self {
        let frame = Arc::clone(handle.frame());
        let data = frame.read_data();
        // The guard borrows from the Arc'd frame it owns, so the borrow
        // outlives every use; the lifetime is erased to make the guard
        // storable.
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(data) };
        Self {
            core: GuardCore {
                page_id: handle.page_id(),
                _frame: frame,
                release: Some(release),
                dirtied: false,
            },
            data,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.core.release();
    }
}

/// RAII exclusive access to a page. Holds the frame's data lock in write
/// mode; on drop, releases the lock and unpins, reporting the page dirty if
/// it was written through `data_mut`.
pub struct WritePageGuard {
    core: GuardCore,
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    pub(crate) fn new(handle: PageHandle, release: ReleaseFn) -> Self {
        let frame = Arc::clone(handle.frame());
        let data = frame.write_data();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(data) };
        Self {
            core: GuardCore {
                page_id: handle.page_id(),
                _frame: frame,
                release: Some(release),
                dirtied: false,
            },
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().expect("data lock held until drop")[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.core.dirtied = true;
        &mut self.data.as_mut().expect("data lock held until drop")[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Release the data lock before unpinning: the unpin path takes the
        // pool latch, and flushers holding that latch may be waiting on the
        // data lock.
        self.data.take();
        self.core.release();
    }
}
