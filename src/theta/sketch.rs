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

//! `ThetaSketch` (C5): the mutable, updatable theta sketch.

use byteorder::{ByteOrder, LittleEndian};

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
use crate::theta::hash_table::UpdateResult;
use crate::theta::serialization::FAMILY_QUICKSELECT;
use crate::theta::serialization::FLAG_IS_EMPTY;
use crate::theta::serialization::HASH_SIZE_BYTES;
use crate::theta::serialization::PRE_LONGS_ESTIMATING;
use crate::theta::serialization::PRE_LONGS_EXACT_COMPACT;
use crate::theta::serialization::decode_any;
use crate::theta::serialization::write_header;

/// A mutable, updatable theta sketch.
///
/// Consumes items through [`update`](Self::update) and maintains a bounded
/// open-addressing table of their hashes (C4), trimming itself via
/// quickselect once it outgrows its nominal size. Read access (estimate,
/// serialization, conversion to [`CompactThetaSketch`]) never mutates it.
///
/// # Examples
///
/// ```
/// use datasketches_theta::theta::{ThetaSketch, ThetaSketchView};
///
/// let mut sketch = ThetaSketch::builder().lg_k(12).build();
/// sketch.update("apple");
/// sketch.update("banana");
/// sketch.update("apple");
///
/// assert_eq!(sketch.num_retained(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ThetaSketch {
    table: ThetaHashTable,
}

impl ThetaSketch {
    /// Starts a [`ThetaSketchBuilder`].
    pub fn builder() -> ThetaSketchBuilder {
        ThetaSketchBuilder::default()
    }

    /// Updates the sketch with any [`UpdatableItem`] (integers, floats,
    /// strings, byte slices, UTF-16 code units, or `i32`/`i64` arrays).
    ///
    /// A null/empty encoding (e.g. an empty string) is a no-op.
    pub fn update<T: UpdatableItem>(&mut self, item: T) -> UpdateResult {
        self.table.update_item(item)
    }

    /// Forces a quickselect rebuild down to at most `k` retained entries,
    /// unconditionally (even if already at or under `k`).
    pub fn rebuild(&mut self) {
        self.table.rebuild();
    }

    /// Rebuilds only if currently above nominal size; a cheaper, idempotent
    /// alternative to [`rebuild`](Self::rebuild).
    pub fn trim(&mut self) {
        self.table.trim();
    }

    /// Clears the sketch back to its freshly-built state.
    pub fn reset(&mut self) {
        self.table.reset();
    }

    pub fn lg_k(&self) -> u8 {
        self.table.lg_nom_size()
    }

    pub fn seed(&self) -> u64 {
        self.table.seed()
    }

    /// The p-sampling probability this sketch was constructed with.
    pub fn p(&self) -> f32 {
        self.table.p()
    }

    /// Produces an immutable [`CompactThetaSketch`] snapshot.
    ///
    /// Empty and single-entry sketches always collapse to their dedicated
    /// compact shapes regardless of `ordered` (spec §4.5).
    pub fn compact(&self, ordered: bool) -> CompactThetaSketch {
        let mut entries: Vec<u64> = self.table.iter().collect();
        if ordered || entries.len() <= 1 {
            entries.sort_unstable();
        }
        CompactThetaSketch::from_parts(entries, self.table.theta(), self.table.seed_hash(), ordered, self.table.is_empty())
    }

    /// Serializes in the current (serVer 3) update-sketch layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let is_empty = self.is_empty();
        let is_estimating = self.is_estimation_mode();
        let pre_longs = if is_empty {
            1
        } else if is_estimating {
            PRE_LONGS_ESTIMATING
        } else {
            PRE_LONGS_EXACT_COMPACT
        };

        let mut out = Vec::new();
        let mut flags = 0u8;
        if is_empty {
            flags |= FLAG_IS_EMPTY;
        }
        write_header(&mut out, pre_longs, 0, FAMILY_QUICKSELECT, self.lg_k(), self.lg_k(), flags, self.table.seed_hash());

        if is_empty {
            return out;
        }

        let num_entries = self.table.num_retained();
        let mut tail = [0u8; 8];
        LittleEndian::write_u32(&mut tail[0..4], num_entries as u32);
        LittleEndian::write_u32(&mut tail[4..8], self.table.p().to_bits());
        out.extend_from_slice(&tail);

        if is_estimating {
            let mut theta_bytes = [0u8; 8];
            LittleEndian::write_u64(&mut theta_bytes, self.table.theta());
            out.extend_from_slice(&theta_bytes);
        }

        for hash in self.table.iter() {
            let mut hash_bytes = [0u8; HASH_SIZE_BYTES];
            LittleEndian::write_u64(&mut hash_bytes, hash);
            out.extend_from_slice(&hash_bytes);
        }

        out
    }

    /// Deserializes an update-sketch blob produced by [`to_bytes`](Self::to_bytes).
    ///
    /// Uses the default seed; use [`from_bytes_with_seed`](Self::from_bytes_with_seed)
    /// for a non-default one.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_bytes_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    pub fn from_bytes_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let decoded = decode_any(bytes, seed)?;
        let expected_seed_hash = compute_seed_hash(seed);
        if !decoded.is_empty && decoded.seed_hash != expected_seed_hash {
            return Err(Error::seed_mismatch(expected_seed_hash, decoded.seed_hash));
        }
        if !(MIN_LG_K..=MAX_LG_K).contains(&decoded.lg_nom_longs) {
            return Err(Error::argument(format!(
                "lg_nom_longs {} out of range [{MIN_LG_K}, {MAX_LG_K}]",
                decoded.lg_nom_longs
            )));
        }
        let table =
            ThetaHashTable::from_entries(decoded.lg_nom_longs, seed, decoded.p, decoded.theta, decoded.is_empty, &decoded.entries);
        Ok(ThetaSketch { table })
    }
}

impl ThetaSketchView for ThetaSketch {
    fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn is_ordered(&self) -> bool {
        false
    }

    fn num_retained(&self) -> usize {
        self.table.num_retained()
    }

    fn theta64(&self) -> u64 {
        self.table.theta()
    }

    fn seed_hash(&self) -> u16 {
        self.table.seed_hash()
    }

    fn iter_hashes(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.table.iter())
    }
}

/// Builder for [`ThetaSketch`].
#[derive(Debug, Clone)]
pub struct ThetaSketchBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    p: f32,
    seed: u64,
}

impl Default for ThetaSketchBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            resize_factor: ResizeFactor::default(),
            p: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaSketchBuilder {
    /// Sets `lg(k)` directly. Validated by [`try_build`](Self::try_build).
    pub fn log_nominal_entries(mut self, lg_k: u8) -> Self {
        self.lg_k = lg_k;
        self
    }

    /// Sets `k` (rounded up to the next power of two internally is not
    /// performed; `k` must itself be a power of two in `[16, 2^26]`).
    pub fn nominal_entries(mut self, k: u32) -> Self {
        self.lg_k = 32 - k.leading_zeros() as u8 - 1;
        self
    }

    /// Alias matching the upstream builder naming used throughout the
    /// spec's public-operations list.
    pub fn lg_k(self, lg_k: u8) -> Self {
        self.log_nominal_entries(lg_k)
    }

    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    /// Sets the p-sampling probability; must be in `(0.0, 1.0]`.
    pub fn p(mut self, p: f32) -> Self {
        self.p = p;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates parameters and builds the sketch.
    pub fn try_build(self) -> Result<ThetaSketch, Error> {
        if !(MIN_LG_K..=MAX_LG_K).contains(&self.lg_k) {
            return Err(Error::argument(format!("lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {}", self.lg_k)));
        }
        if !(self.p > 0.0 && self.p <= 1.0) {
            return Err(Error::argument(format!("p must be in (0.0, 1.0], got {}", self.p)));
        }
        let table = ThetaHashTable::new(self.lg_k, self.resize_factor, self.p, self.seed);
        Ok(ThetaSketch { table })
    }

    /// Builds the sketch.
    ///
    /// # Panics
    ///
    /// Panics if `lg_k` or `p` are out of range; use [`try_build`](Self::try_build)
    /// to handle invalid parameters without panicking.
    pub fn build(self) -> ThetaSketch {
        self.try_build().expect("invalid ThetaSketchBuilder parameters")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NumStdDev;

    #[test]
    fn empty_sketch_has_zero_estimate() {
        let sketch = ThetaSketch::builder().build();
        assert!(sketch.is_empty());
        assert_eq!(sketch.estimate(), 0.0);
        assert_eq!(sketch.num_retained(), 0);
    }

    #[test]
    fn update_increments_retained_count() {
        let mut sketch = ThetaSketch::builder().lg_k(8).build();
        assert_eq!(sketch.update("a"), UpdateResult::InsertedCountIncremented);
        assert_eq!(sketch.update("b"), UpdateResult::InsertedCountIncremented);
        assert_eq!(sketch.update("a"), UpdateResult::RejectedDuplicate);
        assert!(!sketch.is_empty());
        assert_eq!(sketch.num_retained(), 2);
        assert_eq!(sketch.estimate(), 2.0);
    }

    #[test]
    fn empty_update_is_rejected() {
        let mut sketch = ThetaSketch::builder().build();
        assert_eq!(sketch.update(""), UpdateResult::RejectedNullOrEmptyItem);
        assert!(sketch.is_empty());
    }

    #[test]
    fn lower_and_upper_bounds_bracket_estimate() {
        let mut sketch = ThetaSketch::builder().lg_k(10).build();
        for i in 0..5000i64 {
            sketch.update(i);
        }
        let estimate = sketch.estimate();
        let lb = sketch.lower_bound(NumStdDev::Two);
        let ub = sketch.upper_bound(NumStdDev::Two);
        assert!(lb <= estimate);
        assert!(estimate <= ub);
    }

    #[test]
    fn compact_round_trips_through_bytes() {
        let mut sketch = ThetaSketch::builder().lg_k(8).build();
        for i in 0..20i64 {
            sketch.update(i);
        }
        let compact = sketch.compact(true);
        let bytes = compact.to_bytes();
        let restored = CompactThetaSketch::from_bytes(&bytes).unwrap();
        assert_eq!(compact.estimate(), restored.estimate());
        assert_eq!(compact.seed_hash(), restored.seed_hash());
    }

    #[test]
    fn update_sketch_to_bytes_round_trips() {
        let mut sketch = ThetaSketch::builder().lg_k(6).build();
        for i in 0..10i64 {
            sketch.update(i);
        }
        let bytes = sketch.to_bytes();
        let restored = ThetaSketch::from_bytes(&bytes).unwrap();
        assert_eq!(sketch.num_retained(), restored.num_retained());
        assert_eq!(sketch.theta64(), restored.theta64());
    }

    #[test]
    fn invalid_lg_k_is_rejected() {
        let result = ThetaSketch::builder().lg_k(2).try_build();
        assert!(result.is_err());
    }

    #[test]
    fn invalid_p_is_rejected() {
        let result = ThetaSketch::builder().p(0.0).try_build();
        assert!(result.is_err());
        let result = ThetaSketch::builder().p(1.5).try_build();
        assert!(result.is_err());
    }
}
