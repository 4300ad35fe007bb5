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

//! `ThetaUnion` (C7): a stateful accumulator of any sketch form.

use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::UpdatableItem;
use crate::hash::compute_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketchView;
use crate::theta::hash_table::DEFAULT_LG_K;
use crate::theta::hash_table::MAX_LG_K;
use crate::theta::hash_table::MIN_LG_K;
use crate::theta::hash_table::ThetaHashTable;
use crate::theta::serialization::decode_any;

/// Union (A ∪ B ∪ …): an UpdateSketch-like table whose k is fixed at
/// construction, plus a running theta initialized to `MAX_THETA` and
/// lowered to the min over every input seen so far (spec §4.7).
#[derive(Debug, Clone)]
pub struct ThetaUnion {
    table: ThetaHashTable,
    seed: u64,
    seed_hash: u16,
}

impl ThetaUnion {
    pub fn builder() -> ThetaUnionBuilder {
        ThetaUnionBuilder::default()
    }

    /// Merges a single item, as if it had been `update`d directly into an
    /// `UpdateSketch` feeding this union.
    pub fn update_item<T: UpdatableItem>(&mut self, item: T) {
        self.table.update_item(item);
    }

    /// Merges every retained hash of `view`, lowering theta to
    /// `min(self.theta, view.theta)` and rejecting on seed-hash mismatch
    /// (the empty-sketch wildcard excepted, per spec §6).
    pub fn update_sketch(&mut self, view: &impl ThetaSketchView) -> Result<(), Error> {
        if !view.is_empty() {
            self.check_seed_hash(view.seed_hash())?;
        }
        self.merge_theta_and_hashes(view.theta64(), view.iter_hashes(), view.is_empty());
        Ok(())
    }

    /// Decodes `bytes` (any supported serial version/family) and merges it,
    /// using this union's own seed to validate the seed hash.
    pub fn update_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let decoded = decode_any(bytes, self.seed)?;
        if !decoded.is_empty {
            self.check_seed_hash(decoded.seed_hash)?;
        }
        self.merge_theta_and_hashes(decoded.theta, Box::new(decoded.entries.into_iter()), decoded.is_empty);
        Ok(())
    }

    fn check_seed_hash(&self, incoming: u16) -> Result<(), Error> {
        if self.seed_hash != incoming {
            return Err(Error::seed_mismatch(self.seed_hash, incoming));
        }
        Ok(())
    }

    /// Folds in a new theta / hash set, re-deriving the table so that any
    /// entries already retained above the newly-lowered theta are dropped
    /// rather than left stale (the table's own insert path only ever
    /// screens *new* hashes against the current theta, so a lowered theta
    /// must be applied by rebuilding from the filtered union, not by
    /// mutating the live table in place).
    fn merge_theta_and_hashes(&mut self, theta: u64, hashes: Box<dyn Iterator<Item = u64> + '_>, was_empty: bool) {
        let new_theta = theta.min(self.table.theta());
        let mut combined: Vec<u64> = self.table.iter().filter(|&h| h < new_theta).collect();
        combined.extend(hashes.filter(|&h| h < new_theta));
        combined.sort_unstable();
        combined.dedup();

        let is_empty = self.table.is_empty() && was_empty;
        self.table =
            ThetaHashTable::from_entries(self.table.lg_nom_size(), self.table.seed(), self.table.p(), new_theta, is_empty, &combined);
        self.table.trim();
    }

    /// Snapshots the current accumulation as a [`CompactThetaSketch`].
    /// Does not consume or reset the union's state.
    pub fn get_result(&self, ordered: bool) -> CompactThetaSketch {
        let mut entries: Vec<u64> = self.table.iter().collect();
        if ordered {
            entries.sort_unstable();
        }
        CompactThetaSketch::from_parts(entries, self.table.theta(), self.result_seed_hash(), ordered, self.table.is_empty())
    }

    /// Writes [`get_result`](Self::get_result) into a caller-supplied
    /// buffer, returning the number of bytes written. Rejects (without
    /// writing anything) if `dest` is too small.
    pub fn get_result_into(&self, ordered: bool, dest: &mut [u8]) -> Result<usize, Error> {
        let bytes = self.get_result(ordered).to_bytes();
        if dest.len() < bytes.len() {
            return Err(Error::argument("destination buffer too small for union result").with_context("needed", bytes.len()));
        }
        dest[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn result_seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Serializes the union's own accumulator state (family `Union`).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.get_result(false).to_bytes()
    }

    /// Clears the union back to its freshly-built state.
    pub fn reset(&mut self) {
        self.table.reset();
    }
}

/// Builder for [`ThetaUnion`].
#[derive(Debug, Clone)]
pub struct ThetaUnionBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    seed: u64,
}

impl Default for ThetaUnionBuilder {
    fn default() -> Self {
        Self { lg_k: DEFAULT_LG_K, resize_factor: ResizeFactor::default(), seed: DEFAULT_UPDATE_SEED }
    }
}

impl ThetaUnionBuilder {
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        self.lg_k = lg_k;
        self
    }

    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn try_build(self) -> Result<ThetaUnion, Error> {
        if !(MIN_LG_K..=MAX_LG_K).contains(&self.lg_k) {
            return Err(Error::argument(format!("lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {}", self.lg_k)));
        }
        let table = ThetaHashTable::new(self.lg_k, self.resize_factor, 1.0, self.seed);
        Ok(ThetaUnion { table, seed: self.seed, seed_hash: compute_seed_hash(self.seed) })
    }

    pub fn build(self) -> ThetaUnion {
        self.try_build().expect("invalid ThetaUnionBuilder parameters")
    }
}
