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

//! `ThetaIntersection` (C8): a stateful intersecting accumulator.
//!
//! Unlike [`super::ThetaUnion`], an intersection never grows past the size
//! of its smallest input and never needs to rehash on growth, so it is
//! modeled as a sorted `Vec<u64>` rather than a full
//! [`super::hash_table::ThetaHashTable`]: every step is a linear merge of
//! two already-bounded hash lists, and there is no resize/rebuild policy to
//! reproduce for an accumulator that only ever shrinks.

use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketchView;
use crate::theta::serialization::decode_any;

#[derive(Debug, Clone)]
struct Accumulated {
    entries: Vec<u64>,
    theta: u64,
    is_empty: bool,
}

/// Intersection (A ∩ B ∩ …): "virgin" until the first input arrives, then
/// carries a (possibly empty) hash set and a running theta (spec §4.8).
#[derive(Debug, Clone)]
pub struct ThetaIntersection {
    seed: u64,
    seed_hash: Option<u16>,
    state: Option<Accumulated>,
}

impl ThetaIntersection {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_UPDATE_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed, seed_hash: None, state: None }
    }

    /// True once at least one input has been intersected in.
    pub fn has_result(&self) -> bool {
        self.state.is_some()
    }

    /// Intersects in `view`'s retained set.
    pub fn intersect_sketch(&mut self, view: &impl ThetaSketchView) -> Result<(), Error> {
        if !view.is_empty() {
            self.check_seed_hash(view.seed_hash())?;
        }
        let mut entries: Vec<u64> = view.iter_hashes().collect();
        entries.sort_unstable();
        self.merge_in(entries, view.theta64(), view.is_empty());
        Ok(())
    }

    /// Decodes `bytes` and intersects in its retained set.
    pub fn intersect_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let decoded = decode_any(bytes, self.seed)?;
        if !decoded.is_empty {
            self.check_seed_hash(decoded.seed_hash)?;
        }
        let mut entries = decoded.entries;
        entries.sort_unstable();
        self.merge_in(entries, decoded.theta, decoded.is_empty);
        Ok(())
    }

    fn check_seed_hash(&mut self, incoming: u16) -> Result<(), Error> {
        match self.seed_hash {
            None => {
                self.seed_hash = Some(incoming);
                Ok(())
            }
            Some(expected) if expected == incoming => Ok(()),
            Some(expected) => Err(Error::seed_mismatch(expected, incoming)),
        }
    }

    fn merge_in(&mut self, sorted_entries: Vec<u64>, theta: u64, is_empty: bool) {
        self.state = Some(match self.state.take() {
            None => Accumulated { entries: sorted_entries, theta, is_empty },
            Some(prev) => {
                let new_theta = prev.theta.min(theta);
                let entries = intersect_sorted(&prev.entries, &sorted_entries, new_theta);
                Accumulated { entries, theta: new_theta, is_empty: prev.is_empty || is_empty }
            }
        });
    }

    /// Snapshots the current intersection. Fails with
    /// [`StateError`](crate::ErrorKind::StateError) if no input has been
    /// intersected in yet.
    pub fn get_result(&self, ordered: bool) -> Result<CompactThetaSketch, Error> {
        let state = self.state.as_ref().ok_or_else(|| Error::state("get_result called on a virgin Intersection"))?;
        // `state.entries` is always kept sorted ascending, so the `ordered`
        // request is already satisfied either way.
        let entries: Vec<u64> = state.entries.iter().copied().filter(|&h| h < state.theta).collect();
        Ok(CompactThetaSketch::from_parts(entries, state.theta, self.result_seed_hash(), ordered, state.is_empty))
    }

    /// Writes [`get_result`](Self::get_result) into a caller-supplied
    /// buffer, returning the number of bytes written.
    pub fn get_result_into(&self, ordered: bool, dest: &mut [u8]) -> Result<usize, Error> {
        let bytes = self.get_result(ordered)?.to_bytes();
        if dest.len() < bytes.len() {
            return Err(Error::argument("destination buffer too small for intersection result").with_context("needed", bytes.len()));
        }
        dest[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(self.get_result(true)?.to_bytes())
    }

    pub fn reset(&mut self) {
        self.state = None;
        self.seed_hash = None;
    }

    fn result_seed_hash(&self) -> u16 {
        self.seed_hash.unwrap_or_else(|| compute_seed_hash(self.seed))
    }

    /// A stateless, one-shot intersection of two views, convenient when no
    /// ongoing accumulator is needed.
    pub fn intersect_pair(a: &impl ThetaSketchView, b: &impl ThetaSketchView, ordered: bool) -> Result<CompactThetaSketch, Error> {
        let mut intersection = Self::new();
        intersection.intersect_sketch(a)?;
        intersection.intersect_sketch(b)?;
        intersection.get_result(ordered)
    }
}

impl Default for ThetaIntersection {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-pointer merge of two ascending hash lists, keeping only values
/// common to both and below `theta`.
fn intersect_sorted(a: &[u64], b: &[u64], theta: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] >= theta || b[j] >= theta {
            break;
        }
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theta::ThetaSketch;

    fn sketch_with(range: std::ops::Range<i64>, lg_k: u8) -> ThetaSketch {
        let mut s = ThetaSketch::builder().lg_k(lg_k).build();
        for i in range {
            s.update(i);
        }
        s
    }

    #[test]
    fn virgin_intersection_has_no_result() {
        let intersection = ThetaIntersection::new();
        assert!(!intersection.has_result());
        assert!(intersection.get_result(true).is_err());
    }

    #[test]
    fn full_overlap_intersection_matches_both_inputs() {
        let a = sketch_with(0..512, 12);
        let b = sketch_with(0..512, 12);
        let mut intersection = ThetaIntersection::new();
        intersection.intersect_sketch(&a.compact(false)).unwrap();
        intersection.intersect_sketch(&b.compact(false)).unwrap();
        assert_eq!(intersection.get_result(true).unwrap().estimate(), 512.0);
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = sketch_with(0..256, 10);
        let b = sketch_with(256..512, 10);
        let result = ThetaIntersection::intersect_pair(&a.compact(false), &b.compact(false), true).unwrap();
        assert_eq!(result.num_retained(), 0);
    }

    #[test]
    fn intersection_with_empty_is_empty() {
        let a = sketch_with(0..50, 8);
        let empty = ThetaSketch::builder().lg_k(8).build();
        let result = ThetaIntersection::intersect_pair(&a.compact(false), &empty.compact(false), true).unwrap();
        assert_eq!(result.num_retained(), 0);
        assert!(result.is_empty());
    }

    #[test]
    fn seed_mismatch_is_rejected() {
        let mut a = ThetaSketch::builder().seed(1).build();
        a.update("x");
        let mut b = ThetaSketch::builder().seed(2).build();
        b.update("y");
        let mut intersection = ThetaIntersection::new();
        intersection.intersect_sketch(&a.compact(false)).unwrap();
        assert!(intersection.intersect_sketch(&b.compact(false)).is_err());
    }
}
