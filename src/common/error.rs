use thiserror::Error;

use super::types::{FrameId, PageId};

/// Crate-wide error type.
///
/// Expected failure modes (pool exhausted, page not resident, pin already
/// zero, pinned delete) are encoded as `Ok(None)` / `Ok(false)` by the
/// buffer pool API; only genuine faults surface here.
#[derive(Error, Debug)]
pub enum SiltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("frame id out of range: {0}")]
    InvalidFrameId(FrameId),

    #[error("{0} is pinned and cannot be removed from the replacer")]
    FrameNotEvictable(FrameId),

    #[error("disk scheduler error: {0}")]
    DiskScheduler(String),
}

pub type Result<T> = std::result::Result<T, SiltError>;
