//! Silt - the buffer pool core of a disk-oriented storage engine
//!
//! The crate owns a fixed set of in-memory page frames and mediates all
//! access to on-disk pages through them: callers ask for a page by id, the
//! pool makes it resident, pins its frame while in use, and writes dirty
//! frames back before their frame is reused.
//!
//! # Architecture
//!
//! - **Buffer pool** (`buffer`): the user-facing layer
//!   - `BufferPoolManager`: composes the frame array, free list, page
//!     directory, replacer, and disk collaborator
//!   - `LruKReplacer`: LRU-K eviction policy over frame access history
//!   - `FrameHeader`: per-frame metadata and page bytes
//!   - `PageHandle` and `ReadPageGuard`/`WritePageGuard`: pinned access to
//!     resident pages
//!
//! - **Containers** (`container`): `ExtendibleHashTable`, the concurrent
//!   page-id → frame directory with a doubling directory and local-depth
//!   bucket splits
//!
//! - **Storage** (`storage::disk`): `DiskManager` for page-granular file
//!   I/O and `DiskScheduler`, the background worker the pool routes reads
//!   and writes through
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silt::buffer::BufferPoolManager;
//! use silt::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("app.db").unwrap());
//! let pool = BufferPoolManager::new(64, 2, disk_manager);
//!
//! // Allocate a page, scribble on it, let the guard unpin it.
//! let page_id = {
//!     let handle = pool.new_page().unwrap().unwrap();
//!     handle.data_mut()[0] = 0x2A;
//!     let id = handle.page_id();
//!     pool.unpin_page(id, true).unwrap();
//!     id
//! };
//!
//! pool.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod storage;

pub use common::{FrameId, PageId, Result, SiltError};
