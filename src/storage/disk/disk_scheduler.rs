use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::common::{PageId, Result, SiltError, PAGE_SIZE};

use super::DiskManager;

/// A single disk I/O request handed to the worker thread.
pub struct DiskRequest {
    pub is_write: bool,
    pub page_id: PageId,
    /// Page-sized buffer: read target or write source.
    /// The submitter keeps it valid until the completion fires.
    pub data: *mut u8,
    /// Receives the outcome of the operation.
    pub completion: Option<mpsc::Sender<Result<()>>>,
}

// The pointer is only dereferenced by the worker, and the synchronous
// wrappers below keep the buffer alive until completion.
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    pub fn read(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: false,
            page_id,
            data,
            completion: None,
        }
    }

    pub fn write(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: true,
            page_id,
            data,
            completion: None,
        }
    }

    pub fn with_completion(mut self, completion: mpsc::Sender<Result<()>>) -> Self {
        self.completion = Some(completion);
        self
    }
}

/// Funnels page I/O through a background worker thread fed by a bounded
/// queue. Callers that need the result synchronously block on a completion
/// channel; the worker drains outstanding requests before shutting down.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_tx: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (request_tx, request_rx) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_dm = Arc::clone(&disk_manager);
        let worker_shutdown = Arc::clone(&shutdown);
        let worker = thread::spawn(move || {
            Self::run_worker(worker_dm, request_rx, worker_shutdown);
        });

        Self {
            disk_manager,
            request_tx,
            shutdown,
            worker: Some(worker),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_tx
            .send(request)
            .map_err(|e| SiltError::DiskScheduler(format!("failed to queue request: {e}")))
    }

    /// Reads a page and blocks until it is in `data`.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        self.schedule(DiskRequest::read(page_id, data.as_mut_ptr()).with_completion(tx))?;
        Self::await_completion(&rx)
    }

    /// Writes a page and blocks until it has reached the disk manager.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        // The worker only reads through the pointer for a write request.
        let request =
            DiskRequest::write(page_id, data.as_ptr() as *mut u8).with_completion(tx);
        self.schedule(request)?;
        Self::await_completion(&rx)
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn await_completion(rx: &mpsc::Receiver<Result<()>>) -> Result<()> {
        rx.recv()
            .map_err(|e| SiltError::DiskScheduler(format!("worker dropped completion: {e}")))?
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        request_rx: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(request) = request_rx.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }

            match request_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        let outcome = if request.is_write {
            // Safety: the submitter guarantees `data` stays valid for
            // PAGE_SIZE bytes until the completion is delivered.
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data)
        } else {
            // Safety: as above, and reads get exclusive access.
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data)
        };

        if let Some(completion) = request.completion {
            let _ = completion.send(outcome);
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
