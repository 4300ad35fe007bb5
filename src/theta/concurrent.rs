// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The optional concurrent variant (spec §5): many single-threaded
//! [`LocalThetaBuffer`]s feeding hashes into one shared
//! [`ConcurrentThetaSketch`] through a [`PropagationPool`] background
//! thread.
//!
//! Each `LocalThetaBuffer` is owned by exactly one writer thread at a time
//! and batches hashes locally before handing them to the pool, so readers
//! of the shared sketch only ever contend on the pool's propagation lock,
//! not on every single update.

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::mpsc;

use crate::common::ResizeFactor;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::UpdatableItem;
use crate::hash::item_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketchView;
use crate::theta::hash_table::ThetaHashTable;

/// Default number of locally-buffered hashes before a [`LocalThetaBuffer`]
/// hands its batch to the [`PropagationPool`].
const DEFAULT_LOCAL_BUFFER_CAPACITY: usize = 256;

struct Shared {
    table: Mutex<ThetaHashTable>,
    pending: Mutex<u64>,
    idle: Condvar,
}

/// A theta sketch whose updates may arrive from multiple
/// [`LocalThetaBuffer`]s propagating through a shared [`PropagationPool`].
///
/// Reads (`estimate`, `compact`, iteration) take the same lock writers use;
/// for a consistent snapshot while writers are still active, call
/// [`PropagationPool::quiesce`] first.
#[derive(Clone)]
pub struct ConcurrentThetaSketch {
    shared: Arc<Shared>,
}

impl ConcurrentThetaSketch {
    pub fn new(lg_k: u8, seed: u64) -> Self {
        let table = ThetaHashTable::new(lg_k, ResizeFactor::X8, 1.0, seed);
        Self { shared: Arc::new(Shared { table: Mutex::new(table), pending: Mutex::new(0), idle: Condvar::new() }) }
    }

    /// Starts a [`PropagationPool`] that applies local buffers' flushed
    /// batches into this sketch on a background thread.
    pub fn spawn_pool(&self) -> PropagationPool {
        PropagationPool::new(self.shared.clone())
    }

    /// A point-in-time snapshot. Callers that need a consistent view while
    /// writers are active should [`PropagationPool::quiesce`] first.
    pub fn compact(&self, ordered: bool) -> CompactThetaSketch {
        let table = self.shared.table.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<u64> = table.iter().collect();
        if ordered || entries.len() <= 1 {
            entries.sort_unstable();
        }
        CompactThetaSketch::from_parts(entries, table.theta(), table.seed_hash(), ordered, table.is_empty())
    }

    pub fn estimate(&self) -> f64 {
        self.compact(false).estimate()
    }
}

/// A single-writer local batch of pending hashes, flushed into a
/// [`PropagationPool`] once full or on explicit [`flush`](Self::flush).
pub struct LocalThetaBuffer {
    seed: u64,
    capacity: usize,
    pending: Vec<u64>,
    sender: mpsc::Sender<Batch>,
    shared: Arc<Shared>,
}

struct Batch(Vec<u64>);

impl LocalThetaBuffer {
    pub fn new(pool: &PropagationPool) -> Self {
        Self::with_capacity(pool, DEFAULT_LOCAL_BUFFER_CAPACITY, DEFAULT_UPDATE_SEED)
    }

    pub fn with_capacity(pool: &PropagationPool, capacity: usize, seed: u64) -> Self {
        Self { seed, capacity: capacity.max(1), pending: Vec::new(), sender: pool.sender.clone(), shared: pool.shared.clone() }
    }

    /// Hashes `item` and buffers it locally, flushing automatically once
    /// the local batch reaches capacity.
    pub fn update<T: UpdatableItem>(&mut self, item: T) {
        let encoded = item.encode();
        if encoded.is_empty() {
            return;
        }
        let hash = item_hash(&encoded, self.seed);
        self.pending.push(hash);
        if self.pending.len() >= self.capacity {
            self.flush();
        }
    }

    /// Hands the current batch to the propagation pool, even if not yet at
    /// capacity.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        *self.shared.pending.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        // A full channel or a gone receiver both mean the pool has been
        // torn down; apply locally as a fallback so no hashes are lost.
        if self.sender.send(Batch(batch.clone())).is_err() {
            apply_batch(&self.shared, batch);
        }
    }
}

impl Drop for LocalThetaBuffer {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Owns the background thread that applies [`LocalThetaBuffer`] batches
/// into a [`ConcurrentThetaSketch`]'s shared table.
pub struct PropagationPool {
    sender: mpsc::Sender<Batch>,
    shared: Arc<Shared>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl PropagationPool {
    fn new(shared: Arc<Shared>) -> Self {
        let (sender, receiver) = mpsc::channel::<Batch>();
        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            while let Ok(Batch(hashes)) = receiver.recv() {
                apply_batch(&worker_shared, hashes);
            }
        });
        Self { sender, shared, worker: Some(worker) }
    }

    /// Blocks until every batch sent so far has been applied to the shared
    /// table. Does not prevent new batches from arriving afterward.
    pub fn quiesce(&self) {
        let guard = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = self.shared.idle.wait_while(guard, |pending| *pending > 0).unwrap_or_else(|e| e.into_inner());
    }
}

impl Drop for PropagationPool {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel; the worker thread's `recv`
        // loop then exits and the thread can be joined.
        drop(std::mem::replace(&mut self.sender, mpsc::channel().0));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn apply_batch(shared: &Arc<Shared>, hashes: Vec<u64>) {
    {
        let mut table = shared.table.lock().unwrap_or_else(|e| e.into_inner());
        for hash in hashes {
            table.try_insert_hash(hash);
        }
        table.trim();
    }
    let mut pending = shared.pending.lock().unwrap_or_else(|e| e.into_inner());
    *pending = pending.saturating_sub(1);
    if *pending == 0 {
        shared.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_sketch_counts_distinct_items_from_multiple_writers() {
        let sketch = ConcurrentThetaSketch::new(12, DEFAULT_UPDATE_SEED);
        let pool = sketch.spawn_pool();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool_clone = sketch.spawn_pool();
                std::thread::spawn(move || {
                    let mut buffer = LocalThetaBuffer::with_capacity(&pool_clone, 16, DEFAULT_UPDATE_SEED);
                    for i in 0..200 {
                        buffer.update(format!("writer-{t}-item-{i}"));
                    }
                    buffer.flush();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        pool.quiesce();

        let estimate = sketch.estimate();
        assert!((estimate - 800.0).abs() / 800.0 < 0.1, "estimate {estimate} far from 800");
    }

    #[test]
    fn quiesce_returns_immediately_with_no_pending_batches() {
        let sketch = ConcurrentThetaSketch::new(8, DEFAULT_UPDATE_SEED);
        let pool = sketch.spawn_pool();
        pool.quiesce();
        assert_eq!(sketch.estimate(), 0.0);
    }
}
