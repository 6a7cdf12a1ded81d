use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Sentinel for a frame that holds no page. Never returned by allocation.
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Sentinel frame id.
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Default K for the LRU-K replacement policy.
pub const DEFAULT_LRUK_K: usize = 2;

/// Default number of frames in the buffer pool.
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default entry capacity of an extendible hash table bucket.
pub const DEFAULT_BUCKET_SIZE: usize = 4;
