use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::{FrameId, Result, SiltError};

/// Per-frame bookkeeping. A frame with `access_count == 0` is untracked and
/// sits in neither list.
#[derive(Debug, Default, Clone)]
struct FrameMeta {
    access_count: usize,
    is_evictable: bool,
}

#[derive(Debug)]
struct ReplacerInner {
    frames: Vec<FrameMeta>,
    /// Frames with fewer than k accesses, newest first access at the front.
    /// Eviction scans from the back, so the oldest first access goes first.
    history_list: VecDeque<FrameId>,
    /// Frames with at least k accesses, most recently used at the front.
    cache_list: VecDeque<FrameId>,
    /// Number of frames that are tracked and evictable.
    curr_size: usize,
}

/// LRU-K replacement policy.
///
/// A frame's backward k-distance is the time since its k-th most recent
/// access; frames with fewer than k accesses have infinite distance. Rather
/// than comparing timestamps, the replacer keeps two lists: frames still
/// short of k accesses live in a FIFO ordered by first access (all of them
/// share infinite distance, so the oldest goes first), and frames with k or
/// more accesses fall back to classical LRU among themselves. Victims are
/// always taken from the FIFO before the LRU list.
pub struct LruKReplacer {
    k: usize,
    num_frames: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    /// Creates a replacer tracking frames `[0, num_frames)` with history
    /// depth `k`.
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k >= 1, "history depth must be at least 1");
        Self {
            k,
            num_frames,
            inner: Mutex::new(ReplacerInner {
                frames: vec![FrameMeta::default(); num_frames],
                history_list: VecDeque::new(),
                cache_list: VecDeque::new(),
                curr_size: 0,
            }),
        }
    }

    /// Records an access to the given frame.
    ///
    /// The first access enters the frame into the history FIFO; the k-th
    /// access graduates it to the cache list; later accesses move it back to
    /// the cache list head. Re-accessing a frame still in the history FIFO
    /// does not reorder it.
    pub fn record_access(&self, frame_id: FrameId) -> Result<()> {
        self.check_range(frame_id)?;
        let mut inner = self.inner.lock();
        let idx = frame_id.as_usize();

        inner.frames[idx].access_count += 1;
        let count = inner.frames[idx].access_count;

        if count < self.k {
            if count == 1 {
                inner.history_list.push_front(frame_id);
            }
        } else if count == self.k {
            if let Some(pos) = inner.history_list.iter().position(|&f| f == frame_id) {
                inner.history_list.remove(pos);
            }
            inner.cache_list.push_front(frame_id);
        } else {
            if let Some(pos) = inner.cache_list.iter().position(|&f| f == frame_id) {
                inner.cache_list.remove(pos);
            }
            inner.cache_list.push_front(frame_id);
        }

        Ok(())
    }

    /// Toggles whether a frame may be chosen as an eviction victim. The
    /// reported size changes only when the flag actually changes; frames
    /// without recorded accesses are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_range(frame_id)?;
        let mut inner = self.inner.lock();
        let idx = frame_id.as_usize();

        if inner.frames[idx].access_count == 0 {
            return Ok(());
        }
        if inner.frames[idx].is_evictable != evictable {
            inner.frames[idx].is_evictable = evictable;
            if evictable {
                inner.curr_size += 1;
            } else {
                inner.curr_size -= 1;
            }
        }

        Ok(())
    }

    /// Selects and removes an eviction victim, or returns `None` when no
    /// tracked frame is evictable.
    ///
    /// The history FIFO is scanned first (oldest first access wins), then
    /// the cache list (least recently used wins). The victim's access
    /// history is cleared.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.curr_size == 0 {
            return None;
        }

        let mut victim: Option<FrameId> = None;
        for &frame_id in inner.history_list.iter().rev() {
            if inner.frames[frame_id.as_usize()].is_evictable {
                victim = Some(frame_id);
                break;
            }
        }
        if victim.is_none() {
            for &frame_id in inner.cache_list.iter().rev() {
                if inner.frames[frame_id.as_usize()].is_evictable {
                    victim = Some(frame_id);
                    break;
                }
            }
        }

        let frame_id = victim?;
        inner.unlist(frame_id);
        inner.frames[frame_id.as_usize()] = FrameMeta::default();
        inner.curr_size -= 1;
        Some(frame_id)
    }

    /// Drops a frame from the replacer regardless of its position, clearing
    /// its access history. A frame with no recorded accesses is a no-op;
    /// removing a tracked frame that is not evictable is an error.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.check_range(frame_id)?;
        let mut inner = self.inner.lock();
        let idx = frame_id.as_usize();

        if inner.frames[idx].access_count == 0 {
            return Ok(());
        }
        if !inner.frames[idx].is_evictable {
            return Err(SiltError::FrameNotEvictable(frame_id));
        }

        inner.unlist(frame_id);
        inner.frames[idx] = FrameMeta::default();
        inner.curr_size -= 1;
        Ok(())
    }

    /// Number of frames that are tracked and evictable.
    pub fn size(&self) -> usize {
        self.inner.lock().curr_size
    }

    /// The history depth K.
    pub fn k(&self) -> usize {
        self.k
    }

    fn check_range(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.as_usize() >= self.num_frames {
            return Err(SiltError::InvalidFrameId(frame_id));
        }
        Ok(())
    }
}

impl ReplacerInner {
    /// Removes the frame from whichever list currently holds it.
    fn unlist(&mut self, frame_id: FrameId) {
        if let Some(pos) = self.history_list.iter().position(|&f| f == frame_id) {
            self.history_list.remove(pos);
        } else if let Some(pos) = self.cache_list.iter().position(|&f| f == frame_id) {
            self.cache_list.remove(pos);
        }
    }
}
