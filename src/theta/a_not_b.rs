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

//! `ThetaANotB` (C9): stateful and stateless set difference (A \ B).
//!
//! The stateful form carries a sorted buffer of A's hashes and a running
//! theta; repeated [`not_b`](ThetaANotB::not_b) calls subtract further sets
//! without ever widening the buffer, so like [`super::intersection`] it is
//! a plain sorted `Vec<u64>` rather than a full hash table.

use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketchView;

#[derive(Debug, Clone)]
struct Loaded {
    entries: Vec<u64>,
    theta: u64,
    is_empty: bool,
    seed_hash: u16,
}

/// Stateful A-not-B accumulator: `Unset -> A-loaded -> (repeat not_b) ->
/// A-loaded`, with [`get_result`](Self::get_result) optionally resetting
/// back to `Unset` (spec §4.9).
#[derive(Debug, Clone)]
pub struct ThetaANotB {
    seed: u64,
    state: Option<Loaded>,
}

impl ThetaANotB {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_UPDATE_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed, state: None }
    }

    /// Loads `A`, replacing any previously loaded state.
    pub fn set_a(&mut self, a: &impl ThetaSketchView) {
        let mut entries: Vec<u64> = a.iter_hashes().collect();
        entries.sort_unstable();
        self.state = Some(Loaded { entries, theta: a.theta64(), is_empty: a.is_empty(), seed_hash: a.seed_hash() });
    }

    /// Subtracts `b`'s retained set from the currently loaded buffer.
    /// Panics (via a [`StateError`](crate::ErrorKind::StateError)) if
    /// called before [`set_a`](Self::set_a).
    pub fn not_b(&mut self, b: &impl ThetaSketchView) -> Result<(), Error> {
        let loaded = self.state.as_mut().ok_or_else(|| Error::state("not_b called before set_a"))?;
        if !b.is_empty() && loaded.seed_hash != b.seed_hash() {
            return Err(Error::seed_mismatch(loaded.seed_hash, b.seed_hash()));
        }
        let new_theta = loaded.theta.min(b.theta64());
        let mut b_entries: Vec<u64> = b.iter_hashes().collect();
        b_entries.sort_unstable();
        loaded.entries = subtract_sorted(&loaded.entries, &b_entries, new_theta);
        loaded.theta = new_theta;
        Ok(())
    }

    /// Snapshots the current buffer. `reset_after` clears the loaded state
    /// back to `Unset` once the snapshot has been taken.
    pub fn get_result(&mut self, ordered: bool, reset_after: bool) -> Result<CompactThetaSketch, Error> {
        let loaded = self.state.as_ref().ok_or_else(|| Error::state("get_result called before set_a"))?;
        let entries: Vec<u64> = loaded.entries.iter().copied().filter(|&h| h < loaded.theta).collect();
        let result = CompactThetaSketch::from_parts(entries, loaded.theta, loaded.seed_hash, ordered, loaded.is_empty);
        if reset_after {
            self.state = None;
        }
        Ok(result)
    }

    /// The stateful buffer is a scratch accumulator only; unlike
    /// `Union`/`Intersection` it has no standalone wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Err(Error::unsupported("the stateful A-not-B buffer has no standalone byte serialization"))
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl Default for ThetaANotB {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless, one-shot `A \ B` with the default seed.
pub fn a_not_b(a: &impl ThetaSketchView, b: &impl ThetaSketchView, ordered: bool) -> Result<CompactThetaSketch, Error> {
    a_not_b_with_seed(a, b, ordered, DEFAULT_UPDATE_SEED)
}

/// Stateless, one-shot `A \ B` validated against `seed`.
pub fn a_not_b_with_seed(
    a: &impl ThetaSketchView,
    b: &impl ThetaSketchView,
    ordered: bool,
    seed: u64,
) -> Result<CompactThetaSketch, Error> {
    if !a.is_empty() && !b.is_empty() && a.seed_hash() != b.seed_hash() {
        return Err(Error::seed_mismatch(a.seed_hash(), b.seed_hash()));
    }
    let new_theta = a.theta64().min(b.theta64());
    let mut a_entries: Vec<u64> = a.iter_hashes().collect();
    a_entries.sort_unstable();
    let mut b_entries: Vec<u64> = b.iter_hashes().collect();
    b_entries.sort_unstable();
    let entries = subtract_sorted(&a_entries, &b_entries, new_theta);
    let seed_hash = if a.is_empty() { compute_seed_hash(seed) } else { a.seed_hash() };
    Ok(CompactThetaSketch::from_parts(entries, new_theta, seed_hash, ordered, a.is_empty()))
}

/// Two-pointer merge of two ascending hash lists, keeping values from `a`
/// that are below `theta` and absent from `b`.
fn subtract_sorted(a: &[u64], b: &[u64], theta: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && a[i] < theta {
        while j < b.len() && b[j] < a[i] {
            j += 1;
        }
        if j < b.len() && b[j] == a[i] {
            j += 1;
        } else {
            out.push(a[i]);
        }
        i += 1;
    }
    out
}
