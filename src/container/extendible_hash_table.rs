use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::DEFAULT_BUCKET_SIZE;

struct Bucket<K, V> {
    /// Number of hash bits that discriminate entries in this bucket.
    /// Always at most the directory's global depth.
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            items: Vec::new(),
        }
    }
}

struct Directory<K, V> {
    /// Number of hash bits used to index the directory; its length is
    /// `1 << global_depth`.
    global_depth: usize,
    num_buckets: usize,
    /// Directory slots. Several slots may alias one bucket: a bucket with
    /// local depth L is referenced by exactly `2^(global_depth - L)` slots,
    /// all sharing the same low L index bits.
    slots: Vec<Arc<RwLock<Bucket<K, V>>>>,
}

/// Extendible hash table with a doubling directory and local-depth bucket
/// splits.
///
/// The directory grows by doubling: new slots alias the buckets of their
/// low-bit counterparts, and only the overfull bucket is split, so growth is
/// incremental. Neither the directory nor the buckets ever shrink.
///
/// A single reader-writer lock guards the directory: lookups take it shared,
/// mutations take it exclusive. Bucket contents carry their own lock, but
/// splits and doublings only ever run under the exclusive directory lock.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_size: usize,
    hash_builder: S,
    dir: RwLock<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates a table whose buckets hold up to `bucket_size` entries.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V> Default for ExtendibleHashTable<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_SIZE)
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    /// Creates a table with a caller-supplied hasher. Tests use this to get
    /// deterministic bucket placement.
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Self {
        assert!(bucket_size >= 1, "bucket capacity must be at least 1");
        Self {
            bucket_size,
            hash_builder,
            dir: RwLock::new(Directory {
                global_depth: 0,
                num_buckets: 1,
                slots: vec![Arc::new(RwLock::new(Bucket::new(0)))],
            }),
        }
    }

    /// Looks up the value bound to `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let dir = self.dir.read();
        let idx = self.index_of(key, dir.global_depth);
        let bucket = dir.slots[idx].read();
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Deletes the entry for `key`, returning whether it existed. Buckets
    /// are never merged and the directory never shrinks.
    pub fn remove(&self, key: &K) -> bool {
        let dir = self.dir.write();
        let idx = self.index_of(key, dir.global_depth);
        let mut bucket = dir.slots[idx].write();
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Inserts or overwrites the entry for `key`.
    ///
    /// An existing key is overwritten in place, even in a full bucket.
    /// Otherwise the target bucket is split (doubling the directory whenever
    /// its local depth has caught up with the global depth) until it has
    /// room. A split that sends every entry to one side simply leaves the
    /// other bucket empty and splits again on the next pass.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.dir.write();

        {
            let idx = self.index_of(&key, dir.global_depth);
            let mut bucket = dir.slots[idx].write();
            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
        }

        loop {
            let idx = self.index_of(&key, dir.global_depth);
            let local_depth = {
                let bucket = dir.slots[idx].read();
                if bucket.items.len() < self.bucket_size {
                    break;
                }
                bucket.depth
            };
            if local_depth == dir.global_depth {
                Self::double_directory(&mut dir);
            }
            let target = self.index_of(&key, dir.global_depth);
            self.split_bucket(&mut dir, target);
        }

        let idx = self.index_of(&key, dir.global_depth);
        dir.slots[idx].write().items.push((key, value));
    }

    /// Number of directory index bits currently in use.
    pub fn global_depth(&self) -> usize {
        self.dir.read().global_depth
    }

    /// Local depth of the bucket referenced by directory slot `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        self.dir.read().slots[dir_index].read().depth
    }

    /// Number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.dir.read().num_buckets
    }

    fn index_of(&self, key: &K, global_depth: usize) -> usize {
        let mask = (1usize << global_depth) - 1;
        (self.hash_builder.hash_one(key) as usize) & mask
    }

    /// Doubles the directory; slot `j + 2^G` aliases slot `j`, so every
    /// bucket keeps its full set of referencing slots.
    fn double_directory(dir: &mut Directory<K, V>) {
        let old_len = dir.slots.len();
        for i in 0..old_len {
            let alias = Arc::clone(&dir.slots[i]);
            dir.slots.push(alias);
        }
        dir.global_depth += 1;
    }

    /// Splits the bucket referenced by `idx` at its current local depth L.
    /// Slots referencing it diverge on bit L of their index: clear keeps the
    /// old bucket, set moves to the fresh one. Entries are rehashed across
    /// the pair.
    fn split_bucket(&self, dir: &mut Directory<K, V>, idx: usize) {
        let old = Arc::clone(&dir.slots[idx]);
        let (local_depth, drained) = {
            let mut bucket = old.write();
            let depth = bucket.depth;
            bucket.depth += 1;
            (depth, std::mem::take(&mut bucket.items))
        };

        let fresh = Arc::new(RwLock::new(Bucket::new(local_depth + 1)));
        for (i, slot) in dir.slots.iter_mut().enumerate() {
            if Arc::ptr_eq(slot, &old) && (i >> local_depth) & 1 == 1 {
                *slot = Arc::clone(&fresh);
            }
        }
        dir.num_buckets += 1;

        let global_depth = dir.global_depth;
        for (k, v) in drained {
            let target = self.index_of(&k, global_depth);
            dir.slots[target].write().items.push((k, v));
        }
    }
}
