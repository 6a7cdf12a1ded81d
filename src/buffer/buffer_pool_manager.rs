use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, SiltError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, PageHandle, ReadPageGuard, WritePageGuard};

/// State shared with the RAII page guards so they can unpin after the
/// manager handle itself may have moved on.
struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    /// Serializes every pool operation. The page table and replacer locks
    /// are only ever taken while this is held (pool, then table, then
    /// replacer; never the reverse).
    latch: Mutex<PoolInner>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
}

struct PoolInner {
    free_list: VecDeque<FrameId>,
    next_page_id: u32,
}

impl PoolState {
    /// Shared unpin path for `unpin_page` and the guard release callbacks.
    fn unpin(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let _inner = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            return Ok(false);
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == Some(0) {
            self.replacer.set_evictable(frame_id, true)?;
        }
        Ok(true)
    }
}

/// The buffer pool: a fixed set of in-memory frames mediating all access to
/// on-disk pages.
///
/// Callers request a page by id; the pool makes it resident in some frame,
/// pins the frame against eviction, and hands back a [`PageHandle`]. When
/// every frame is occupied, an LRU-K replacer picks the victim and a dirty
/// victim is written back before its frame is reused. The page-id → frame
/// directory is an extendible hash table.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames over the given disk manager,
    /// with LRU-K history depth `replacer_k`. Every frame starts on the
    /// free list.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            state: Arc::new(PoolState {
                frames,
                latch: Mutex::new(PoolInner {
                    free_list,
                    next_page_id: 0,
                }),
                page_table: ExtendibleHashTable::default(),
                replacer: LruKReplacer::new(replacer_k, pool_size),
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a brand-new page in a frame and pins it.
    ///
    /// Returns `Ok(None)` when every frame is pinned and nothing can be
    /// evicted. The new page's bytes are zeroed; nothing is written to disk
    /// until the page is flushed or evicted dirty.
    pub fn new_page(&self) -> Result<Option<PageHandle>> {
        let mut inner = self.state.latch.lock();

        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_id = PageId::new(inner.next_page_id);
        inner.next_page_id += 1;

        frame.set_page_id(page_id);
        frame.pin();
        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id)?;
        self.state.replacer.set_evictable(frame_id, false)?;

        trace!("allocated {page_id} in {frame_id}");
        Ok(Some(PageHandle::new(Arc::clone(frame))))
    }

    /// Makes `page_id` resident and pins it.
    ///
    /// A hit pins the existing frame; a miss brings the page in from disk,
    /// evicting a victim if the free list is empty. Returns `Ok(None)` when
    /// no frame can be freed.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<PageHandle>> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }
        let mut inner = self.state.latch.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id)?;
            self.state.replacer.set_evictable(frame_id, false)?;
            return Ok(Some(PageHandle::new(Arc::clone(frame))));
        }

        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut image = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut image)?;
        frame.copy_from(&image);
        frame.set_page_id(page_id);
        frame.pin();
        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id)?;
        self.state.replacer.set_evictable(frame_id, false)?;

        trace!("fetched {page_id} from disk into {frame_id}");
        Ok(Some(PageHandle::new(Arc::clone(frame))))
    }

    /// Drops one pin on `page_id`, folding `is_dirty` into the frame's
    /// dirty flag. Returns `Ok(false)` when the page is not resident or its
    /// pin count is already zero. The frame becomes evictable when the last
    /// pin goes away.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes `page_id`'s frame to disk, dirty or not, and clears the dirty
    /// flag. Returns `Ok(false)` when the page is not resident. Pins are
    /// irrelevant here.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }
        let _inner = self.state.latch.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut image = [0u8; PAGE_SIZE];
        frame.copy_to(&mut image);
        self.disk_scheduler.schedule_write_sync(page_id, &image)?;
        frame.set_dirty(false);

        debug!("flushed {page_id}");
        Ok(true)
    }

    /// Writes every resident page to disk and clears all dirty flags.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _inner = self.state.latch.lock();

        for frame in &self.state.frames {
            if !frame.is_valid() {
                continue;
            }
            let page_id = frame.page_id();
            let mut image = [0u8; PAGE_SIZE];
            frame.copy_to(&mut image);
            self.disk_scheduler.schedule_write_sync(page_id, &image)?;
            frame.set_dirty(false);
        }

        debug!("flushed all resident pages");
        Ok(())
    }

    /// Evicts `page_id` from the pool and deallocates it on disk.
    ///
    /// A page that is not resident is vacuously deleted (`Ok(true)`); a
    /// pinned page cannot be deleted (`Ok(false)`).
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.latch.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        self.state.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id)?;
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        debug!("deleted {page_id}, {frame_id} returned to free list");
        Ok(true)
    }

    /// Pinned read access: fetches the page and wraps it in a guard that
    /// unpins on drop.
    pub fn read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        let Some(handle) = self.fetch_page(page_id)? else {
            return Ok(None);
        };
        let state = Arc::clone(&self.state);
        let guard = ReadPageGuard::new(
            handle,
            Box::new(move |pid, dirty| {
                let _ = state.unpin(pid, dirty);
            }),
        );
        Ok(Some(guard))
    }

    /// Pinned write access: fetches the page and wraps it in a guard that
    /// unpins on drop, reporting dirtiness if the guard was written through.
    pub fn write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        let Some(handle) = self.fetch_page(page_id)? else {
            return Ok(None);
        };
        let state = Arc::clone(&self.state);
        let guard = WritePageGuard::new(
            handle,
            Box::new(move |pid, dirty| {
                let _ = state.unpin(pid, dirty);
            }),
        );
        Ok(Some(guard))
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of frames currently on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.state.latch.lock().free_list.len()
    }

    /// Pin count of a resident page, or `None` if the page is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _inner = self.state.latch.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// The disk manager backing this pool.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Produces a frame ready to take on a new identity: the free list is
    /// preferred, otherwise the replacer picks a victim. The victim's
    /// mapping is removed, its bytes are written back if dirty, and the
    /// frame is reset. Returns `Ok(None)` when nothing can be evicted.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        self.state.page_table.remove(&old_page_id);
        if frame.is_dirty() {
            debug!("evicting dirty {old_page_id} from {frame_id}");
            let mut image = [0u8; PAGE_SIZE];
            frame.copy_to(&mut image);
            self.disk_scheduler.schedule_write_sync(old_page_id, &image)?;
        } else {
            trace!("evicting clean {old_page_id} from {frame_id}");
        }
        frame.reset();

        Ok(Some(frame_id))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;

    fn create_pool(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        (BufferPoolManager::new(pool_size, 2, disk_manager), temp_file)
    }

    #[test]
    fn new_pool_has_all_frames_free() {
        let (pool, _temp) = create_pool(8);
        assert_eq!(pool.pool_size(), 8);
        assert_eq!(pool.free_frame_count(), 8);
    }

    #[test]
    fn new_page_is_pinned_and_counted() {
        let (pool, _temp) = create_pool(8);

        let handle = pool.new_page().unwrap().unwrap();
        assert_eq!(handle.page_id(), PageId::new(0));
        assert_eq!(handle.pin_count(), 1);
        assert_eq!(pool.free_frame_count(), 7);
    }

    #[test]
    fn page_ids_are_monotone() {
        let (pool, _temp) = create_pool(8);

        for expected in 0..5u32 {
            let handle = pool.new_page().unwrap().unwrap();
            assert_eq!(handle.page_id(), PageId::new(expected));
            pool.unpin_page(handle.page_id(), false).unwrap();
        }
    }

    #[test]
    fn fetch_hit_bumps_pin_count() {
        let (pool, _temp) = create_pool(4);

        let handle = pool.new_page().unwrap().unwrap();
        let page_id = handle.page_id();

        let second = pool.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(second.pin_count(), 2);

        assert!(pool.unpin_page(page_id, false).unwrap());
        assert!(pool.unpin_page(page_id, false).unwrap());
        assert!(!pool.unpin_page(page_id, false).unwrap());
    }

    #[test]
    fn unpin_unknown_page_is_false() {
        let (pool, _temp) = create_pool(4);
        assert!(!pool.unpin_page(PageId::new(42), false).unwrap());
    }

    #[test]
    fn data_survives_eviction() {
        let (pool, _temp) = create_pool(2);

        let first = pool.new_page().unwrap().unwrap();
        let first_id = first.page_id();
        first.data_mut()[0] = 0xAA;
        pool.unpin_page(first_id, true).unwrap();

        // Crowd the first page out of the pool.
        for _ in 0..2 {
            let handle = pool.new_page().unwrap().unwrap();
            pool.unpin_page(handle.page_id(), false).unwrap();
        }

        let back = pool.fetch_page(first_id).unwrap().unwrap();
        assert_eq!(back.data()[0], 0xAA);
        pool.unpin_page(first_id, false).unwrap();
    }

    #[test]
    fn pool_exhaustion_returns_none() {
        let (pool, _temp) = create_pool(2);

        let _a = pool.new_page().unwrap().unwrap();
        let _b = pool.new_page().unwrap().unwrap();
        assert!(pool.new_page().unwrap().is_none());
        assert!(pool.fetch_page(PageId::new(99)).unwrap().is_none());
    }

    #[test]
    fn flush_clears_dirty_flag() {
        let (pool, _temp) = create_pool(4);

        let handle = pool.new_page().unwrap().unwrap();
        let page_id = handle.page_id();
        handle.data_mut()[0] = 1;
        pool.unpin_page(page_id, true).unwrap();
        assert!(handle.is_dirty());

        assert!(pool.flush_page(page_id).unwrap());
        assert!(!handle.is_dirty());

        assert!(!pool.flush_page(PageId::new(1000)).unwrap());
    }

    #[test]
    fn delete_page_frees_the_frame() {
        let (pool, _temp) = create_pool(4);

        let handle = pool.new_page().unwrap().unwrap();
        let page_id = handle.page_id();

        // Pinned: refused.
        assert!(!pool.delete_page(page_id).unwrap());

        pool.unpin_page(page_id, false).unwrap();
        assert!(pool.delete_page(page_id).unwrap());
        assert_eq!(pool.pin_count(page_id), None);
        assert_eq!(pool.free_frame_count(), 4);

        // Not resident: vacuously deleted.
        assert!(pool.delete_page(page_id).unwrap());
    }

    #[test]
    fn guards_unpin_on_drop() {
        let (pool, _temp) = create_pool(4);

        let page_id = {
            let handle = pool.new_page().unwrap().unwrap();
            let id = handle.page_id();
            pool.unpin_page(id, false).unwrap();
            id
        };

        {
            let mut guard = pool.write_page(page_id).unwrap().unwrap();
            guard.data_mut()[10] = 7;
            assert_eq!(pool.pin_count(page_id), Some(1));
        }
        assert_eq!(pool.pin_count(page_id), Some(0));

        {
            let guard = pool.read_page(page_id).unwrap().unwrap();
            assert_eq!(guard.data()[10], 7);
        }
        assert_eq!(pool.pin_count(page_id), Some(0));
    }
}
