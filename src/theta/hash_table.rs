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

//! The open-addressing QuickSelect hash table (C4) backing [`super::ThetaSketch`]
//! and [`super::ThetaUnion`].
//!
//! Entries are 64-bit hashes with the top bit always clear (`0` marks an
//! empty slot and is never a valid stored hash). Growth follows the active
//! [`ResizeFactor`] up to `lgNomSize + 1`; beyond that, insertion rebuilds
//! the table via quickselect, keeping exactly the `k` smallest hashes and
//! raising theta to the new k-th smallest value.

use crate::common::ResizeFactor;
use crate::hash::UpdatableItem;
use crate::hash::compute_seed_hash;
use crate::hash::item_hash;

/// Maximum theta value: `2^63 - 1`, interpreted as "1.0" (no sampling).
pub const MAX_THETA: u64 = i64::MAX as u64;

/// Minimum `lg(k)` accepted by a builder.
pub const MIN_LG_K: u8 = 4;

/// Maximum `lg(k)` accepted by a builder.
pub const MAX_LG_K: u8 = 26;

/// Default `lg(k)`, matching the upstream default nominal size of 4096.
pub const DEFAULT_LG_K: u8 = 12;

/// Minimum table size a builder will ever start at.
const MIN_LG_ARR_SIZE: u8 = 5;

/// Resize threshold while growing towards `lgNomSize + 1` (1/2 load factor).
const RESIZE_THRESHOLD: f64 = 0.5;

/// Rebuild threshold once the table has reached `lgNomSize + 1` (15/16 load factor).
pub(crate) const REBUILD_THRESHOLD: f64 = 15.0 / 16.0;

const STRIDE_HASH_BITS: u32 = 7;
const STRIDE_MASK: u64 = (1 << STRIDE_HASH_BITS) - 1;

/// The outcome of a single [`ThetaHashTable::update_item`] call, mirroring
/// the upstream update-return-state enum (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// A new hash was accepted and `curCount` grew.
    InsertedCountIncremented,
    /// The hash was accepted but `curCount` did not grow (reserved for
    /// modes this crate's single-writer table never produces; kept for
    /// API parity with the upstream enum).
    InsertedCountNotIncremented,
    /// The hash was already present.
    RejectedDuplicate,
    /// `item_hash(item) >= theta`.
    RejectedOverTheta,
    /// The item's canonical encoding was empty (null/empty update).
    RejectedNullOrEmptyItem,
}

impl UpdateResult {
    /// True for any variant that represents a successfully retained hash
    /// (whether or not it was already present).
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            UpdateResult::InsertedCountIncremented | UpdateResult::InsertedCountNotIncremented
        )
    }
}

/// Open-addressing hash table of retained sketch hashes.
#[derive(Debug, Clone)]
pub(crate) struct ThetaHashTable {
    lg_cur_size: u8,
    lg_nom_size: u8,
    resize_factor: ResizeFactor,
    p: f32,
    theta_init: u64,
    hash_seed: u64,

    /// Logical emptiness of the source multiset. Can be `false` even when
    /// `num_retained() == 0` (every update was screened by theta).
    is_empty: bool,

    theta: u64,
    entries: Vec<u64>,
    num_retained: usize,
}

impl ThetaHashTable {
    /// Builds a fresh table for a freshly-constructed `ThetaSketch`.
    pub fn new(lg_nom_size: u8, resize_factor: ResizeFactor, p: f32, hash_seed: u64) -> Self {
        let lg_max_size = lg_nom_size + 1;
        let lg_cur_size = starting_sub_multiple(lg_max_size, MIN_LG_ARR_SIZE, resize_factor.lg_value());
        let theta_init = theta_from_p(p);
        Self {
            lg_cur_size,
            lg_nom_size,
            resize_factor,
            p,
            theta_init,
            hash_seed,
            is_empty: true,
            theta: theta_init,
            entries: vec![0u64; 1usize << lg_cur_size],
            num_retained: 0,
        }
    }

    /// Rebuilds a table from a previously decoded or computed set of
    /// hashes (all assumed distinct and `< theta`), used by deserialization
    /// and by the set operators to materialize an intermediate result.
    /// Sized to hold the given entries at the rebuild load factor without
    /// immediately triggering a rebuild.
    ///
    /// `p` is the originally-constructed p-sampling floor (`1.0` for
    /// set-operator accumulators, which never p-sample); it determines
    /// `theta_init`, the value `reset()` restores `theta` to.
    pub fn from_entries(lg_nom_size: u8, hash_seed: u64, p: f32, theta: u64, is_empty: bool, entries: &[u64]) -> Self {
        let lg_max_size = lg_nom_size + 1;
        let needed = ((entries.len() as f64 / REBUILD_THRESHOLD).ceil() as usize).max(1 << MIN_LG_ARR_SIZE);
        let mut lg_cur_size = MIN_LG_ARR_SIZE;
        while (1usize << lg_cur_size) < needed && lg_cur_size < lg_max_size {
            lg_cur_size += 1;
        }
        let mut table = Self {
            lg_cur_size,
            lg_nom_size,
            resize_factor: ResizeFactor::X1,
            p,
            theta_init: theta_from_p(p),
            hash_seed,
            is_empty,
            theta,
            entries: vec![0u64; 1usize << lg_cur_size],
            num_retained: 0,
        };
        for &h in entries {
            table.insert_no_screen(h);
        }
        table
    }

    /// Hashes `item` and applies the p-sampling / theta gate, inserting it
    /// on acceptance.
    pub fn update_item<T: UpdatableItem>(&mut self, item: T) -> UpdateResult {
        let encoded = item.encode();
        if encoded.is_empty() {
            return UpdateResult::RejectedNullOrEmptyItem;
        }
        self.is_empty = false;
        let hash = item_hash(&encoded, self.hash_seed);
        self.try_insert_hash(hash)
    }

    /// Inserts an already-computed, already-screened-by-caller hash. Used
    /// by set operators merging hashes pulled from another sketch.
    ///
    /// The theta gate is still applied: `hash >= theta` is rejected.
    pub fn try_insert_hash(&mut self, hash: u64) -> UpdateResult {
        if hash == 0 || hash >= self.theta {
            return UpdateResult::RejectedOverTheta;
        }
        match self.find_slot(hash) {
            Slot::Occupied(_) => UpdateResult::RejectedDuplicate,
            Slot::Empty(index) => {
                self.entries[index] = hash;
                self.num_retained += 1;
                self.maybe_grow_or_rebuild();
                UpdateResult::InsertedCountIncremented
            }
        }
    }

    /// Inserts a hash known to be distinct and below theta, without
    /// returning a result or re-checking theta. Used when rebuilding a
    /// table from a hash set already known to satisfy the invariants.
    fn insert_no_screen(&mut self, hash: u64) {
        if hash == 0 {
            return;
        }
        if let Slot::Empty(index) = self.find_slot(hash) {
            self.entries[index] = hash;
            self.num_retained += 1;
        }
    }

    fn find_slot(&self, key: u64) -> Slot {
        let size = self.entries.len();
        let mask = (size - 1) as u64;
        let stride = Self::stride(key, self.lg_cur_size);
        let mut index = key & mask;
        let start = index;
        loop {
            let probe = self.entries[index as usize];
            if probe == 0 {
                return Slot::Empty(index as usize);
            }
            if probe == key {
                return Slot::Occupied(index as usize);
            }
            index = (index + stride) & mask;
            if index == start {
                unreachable!("hash table probed a full cycle without an empty slot");
            }
        }
    }

    fn stride(key: u64, lg_size: u8) -> u64 {
        (2 * ((key >> lg_size) & STRIDE_MASK)) | 1
    }

    fn maybe_grow_or_rebuild(&mut self) {
        let lg_max_size = self.lg_nom_size + 1;
        let threshold = if self.lg_cur_size < lg_max_size {
            RESIZE_THRESHOLD
        } else {
            REBUILD_THRESHOLD
        };
        let capacity = (threshold * self.entries.len() as f64) as usize;
        if self.num_retained <= capacity {
            return;
        }
        if self.lg_cur_size < lg_max_size {
            self.grow(lg_max_size);
        } else {
            self.rebuild();
        }
    }

    fn grow(&mut self, lg_max_size: u8) {
        let new_lg_size = (self.lg_cur_size + self.resize_factor.lg_value().max(1)).min(lg_max_size);
        self.rehash_into(new_lg_size);
    }

    fn rehash_into(&mut self, new_lg_size: u8) {
        let new_size = 1usize << new_lg_size;
        let old_entries = std::mem::replace(&mut self.entries, vec![0u64; new_size]);
        self.lg_cur_size = new_lg_size;
        self.num_retained = 0;
        for entry in old_entries {
            if entry != 0 {
                self.insert_no_screen(entry);
            }
        }
    }

    /// Unconditional quickselect rebuild: keeps the `k` smallest hashes and
    /// raises theta to the new k-th smallest value.
    pub fn rebuild(&mut self) {
        let k = 1usize << self.lg_nom_size;
        let mut live: Vec<u64> = self.entries.iter().copied().filter(|&e| e != 0).collect();
        if live.len() <= k {
            return;
        }
        let (lesser, &mut kth, _) = live.select_nth_unstable(k);
        self.theta = kth;
        let lesser = lesser.to_vec();
        self.entries.fill(0);
        self.num_retained = 0;
        for h in lesser {
            self.insert_no_screen(h);
        }
    }

    /// Rebuilds only if `num_retained` currently exceeds the nominal size.
    pub fn trim(&mut self) {
        if self.num_retained > (1usize << self.lg_nom_size) {
            self.rebuild();
        }
    }

    /// Resets to the freshly-constructed empty state.
    pub fn reset(&mut self) {
        let lg_max_size = self.lg_nom_size + 1;
        let lg_cur_size = starting_sub_multiple(lg_max_size, MIN_LG_ARR_SIZE, self.resize_factor.lg_value());
        self.entries = vec![0u64; 1usize << lg_cur_size];
        self.lg_cur_size = lg_cur_size;
        self.num_retained = 0;
        self.theta = self.theta_init;
        self.is_empty = true;
    }

    pub fn num_retained(&self) -> usize {
        self.num_retained
    }

    pub fn theta(&self) -> u64 {
        self.theta
    }

    /// The p-sampling probability this table was constructed with.
    pub fn p(&self) -> f32 {
        self.p
    }

    /// The theta floor `reset()` restores `theta` to: `MAX_THETA` unless a
    /// p-sampling probability below `1.0` was supplied at construction.
    pub fn theta_init(&self) -> u64 {
        self.theta_init
    }

    pub fn set_theta(&mut self, theta: u64) {
        self.theta = theta;
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn set_empty(&mut self, is_empty: bool) {
        self.is_empty = is_empty;
    }

    pub fn contains_hash(&self, hash: u64) -> bool {
        matches!(self.find_slot(hash), Slot::Occupied(_))
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied().filter(|&e| e != 0)
    }

    pub fn lg_nom_size(&self) -> u8 {
        self.lg_nom_size
    }

    pub fn seed(&self) -> u64 {
        self.hash_seed
    }

    pub fn seed_hash(&self) -> u16 {
        compute_seed_hash(self.hash_seed)
    }
}

enum Slot {
    Empty(usize),
    Occupied(usize),
}

/// Smallest `lg_init >= lg_min` such that `lg_target = lg_init + n *
/// lg_resize_factor` for some non-negative integer `n` (so that growth
/// steps land exactly on `lg_target`).
fn starting_sub_multiple(lg_target: u8, lg_min: u8, lg_resize_factor: u8) -> u8 {
    if lg_target <= lg_min {
        lg_min
    } else if lg_resize_factor == 0 {
        lg_target
    } else {
        let diff = lg_target - lg_min;
        lg_min + diff % lg_resize_factor
    }
}

fn theta_from_p(p: f32) -> u64 {
    if p >= 1.0 {
        MAX_THETA
    } else {
        ((MAX_THETA as f64) * (p as f64)) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::DEFAULT_UPDATE_SEED;

    #[test]
    fn new_table_is_empty() {
        let table = ThetaHashTable::new(8, ResizeFactor::X8, 1.0, DEFAULT_UPDATE_SEED);
        assert!(table.is_empty());
        assert_eq!(table.num_retained(), 0);
        assert_eq!(table.theta(), MAX_THETA);
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn p_sampling_sets_initial_theta() {
        let table = ThetaHashTable::new(8, ResizeFactor::X8, 0.5, DEFAULT_UPDATE_SEED);
        assert_eq!(table.theta(), (MAX_THETA as f64 * 0.5) as u64);
    }

    #[test]
    fn insert_and_dedup() {
        let mut table = ThetaHashTable::new(6, ResizeFactor::X8, 1.0, DEFAULT_UPDATE_SEED);
        assert_eq!(table.update_item("apple"), UpdateResult::InsertedCountIncremented);
        assert_eq!(table.num_retained(), 1);
        assert_eq!(table.update_item("apple"), UpdateResult::RejectedDuplicate);
        assert_eq!(table.num_retained(), 1);
    }

    #[test]
    fn empty_item_is_rejected_without_clearing_empty_flag() {
        let mut table = ThetaHashTable::new(6, ResizeFactor::X8, 1.0, DEFAULT_UPDATE_SEED);
        assert_eq!(table.update_item(""), UpdateResult::RejectedNullOrEmptyItem);
        assert!(table.is_empty());
    }

    #[test]
    fn grow_then_rebuild_keeps_count_at_k() {
        let mut table = ThetaHashTable::new(5, ResizeFactor::X2, 1.0, DEFAULT_UPDATE_SEED);
        for i in 0..5000 {
            table.update_item(format!("item-{i}"));
        }
        assert!(table.num_retained() <= (1 << 5) + 1);
        assert!(table.theta() < MAX_THETA);
        // Invariant: every retained hash is below theta.
        let theta = table.theta();
        assert!(table.iter().all(|h| h < theta));
    }

    #[test]
    fn rebuild_is_idempotent_once_at_or_under_k() {
        let mut table = ThetaHashTable::new(10, ResizeFactor::X8, 1.0, DEFAULT_UPDATE_SEED);
        for i in 0..10 {
            table.update_item(format!("item-{i}"));
        }
        let before = table.num_retained();
        table.trim();
        assert_eq!(table.num_retained(), before);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut table = ThetaHashTable::new(8, ResizeFactor::X8, 0.25, DEFAULT_UPDATE_SEED);
        let initial_theta = table.theta();
        for i in 0..50 {
            table.update_item(i);
        }
        table.reset();
        assert!(table.is_empty());
        assert_eq!(table.num_retained(), 0);
        assert_eq!(table.theta(), initial_theta);
    }

    #[test]
    fn from_entries_reconstructs_exact_retained_set() {
        let entries = vec![10u64, 20, 30, 40];
        let table = ThetaHashTable::from_entries(8, DEFAULT_UPDATE_SEED, 1.0, MAX_THETA, false, &entries);
        assert_eq!(table.num_retained(), entries.len());
        let mut iterated: Vec<u64> = table.iter().collect();
        iterated.sort_unstable();
        assert_eq!(iterated, entries);
    }
}
