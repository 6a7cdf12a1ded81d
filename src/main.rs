use std::sync::Arc;

use silt::buffer::BufferPoolManager;
use silt::storage::disk::DiskManager;

fn main() {
    env_logger::init();

    println!("silt - buffer pool demo");
    println!("=======================\n");

    let db_path = "demo.db";
    let disk_manager =
        Arc::new(DiskManager::new(db_path).expect("failed to create disk manager"));
    println!("opened database file: {db_path}");

    let pool = BufferPoolManager::new(8, 2, disk_manager);
    println!("created buffer pool with {} frames\n", pool.pool_size());

    // Allocate a handful of pages and stamp each with its own id.
    let mut page_ids = Vec::new();
    for _ in 0..12 {
        let handle = pool
            .new_page()
            .expect("disk failure")
            .expect("pool exhausted");
        let page_id = handle.page_id();
        handle.data_mut()[..4].copy_from_slice(&page_id.as_u32().to_le_bytes());
        pool.unpin_page(page_id, true).expect("unpin failed");
        page_ids.push(page_id);
    }
    println!("allocated {} pages across 8 frames", page_ids.len());

    // Read them all back; the first few come in from disk again.
    for &page_id in &page_ids {
        let guard = pool
            .read_page(page_id)
            .expect("disk failure")
            .expect("pool exhausted");
        let stamp = u32::from_le_bytes(guard.data()[..4].try_into().unwrap());
        assert_eq!(stamp, page_id.as_u32());
    }
    println!("verified every page round-tripped through eviction");

    pool.flush_all_pages().expect("flush failed");
    let dm = pool.disk_manager();
    println!(
        "\ndisk traffic: {} reads, {} writes",
        dm.num_reads(),
        dm.num_writes()
    );
}
