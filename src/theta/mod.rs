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

//! Theta sketches: mergeable, set-operable approximate distinct counting.
//!
//! - [`ThetaSketch`] is the mutable, updatable sketch.
//! - [`CompactThetaSketch`] is its immutable, serializable snapshot.
//! - [`ThetaUnion`], [`ThetaIntersection`] and the free function
//!   [`a_not_b::a_not_b`] / stateful [`a_not_b::ThetaANotB`] implement the
//!   three set operators.
//!
//! All four share the [`ThetaSketchView`] contract below, which supplies
//! `estimate`/`lower_bound`/`upper_bound` in terms of whatever a concrete
//! sketch shape exposes as its retained-hash count and theta.

mod a_not_b;
mod bitpack;
mod compact;
mod concurrent;
mod hash_table;
mod intersection;
mod serialization;
mod sketch;
mod union;

pub use a_not_b::ThetaANotB;
pub use a_not_b::a_not_b;
pub use a_not_b::a_not_b_with_seed;
pub use compact::CompactThetaSketch;
pub use concurrent::ConcurrentThetaSketch;
pub use concurrent::LocalThetaBuffer;
pub use concurrent::PropagationPool;
pub use hash_table::MAX_LG_K;
pub use hash_table::MIN_LG_K;
pub use hash_table::UpdateResult;
pub use intersection::ThetaIntersection;
pub use sketch::ThetaSketch;
pub use sketch::ThetaSketchBuilder;
pub use union::ThetaUnion;
pub use union::ThetaUnionBuilder;

use crate::common::NumStdDev;
use crate::common::binomial_bounds;
use hash_table::MAX_THETA;

/// The shared read-only contract over every theta-sketch shape: the mutable
/// [`ThetaSketch`], the immutable [`CompactThetaSketch`], and the result of
/// a set operator.
///
/// Implementors provide the raw quantities (`theta64`, `num_retained`,
/// `seed_hash`, the hash iterator); this trait derives `estimate` and the
/// confidence bounds from them identically for every shape.
pub trait ThetaSketchView {
    /// True only for the canonical empty sketch (no items ever seen, not
    /// merely zero retained hashes under sampling).
    fn is_empty(&self) -> bool;

    /// True if the retained hashes are known to be sorted ascending.
    fn is_ordered(&self) -> bool;

    /// Number of hashes currently retained (`< theta64()`).
    fn num_retained(&self) -> usize;

    /// The raw 64-bit theta value; `MAX_THETA` means "no sampling" (exact
    /// mode, modulo theta's own rounding).
    fn theta64(&self) -> u64;

    /// The 16-bit seed-hash identity tag (spec §3 and §6).
    fn seed_hash(&self) -> u16;

    /// Iterates the retained hashes in whatever order the implementor
    /// stores them (see [`is_ordered`](Self::is_ordered)).
    fn iter_hashes(&self) -> Box<dyn Iterator<Item = u64> + '_>;

    /// Theta as a probability in `(0.0, 1.0]`.
    fn theta(&self) -> f64 {
        self.theta64() as f64 / MAX_THETA as f64
    }

    /// True once theta has dropped below 1.0 (the sketch is sampling rather
    /// than counting exactly).
    fn is_estimation_mode(&self) -> bool {
        self.theta64() < MAX_THETA
    }

    /// The distinct-count estimate: `num_retained / theta`, or `0.0` for a
    /// logically empty sketch.
    fn estimate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.num_retained() as f64 / self.theta()
        }
    }

    /// Lower confidence bound at `kappa` standard deviations.
    fn lower_bound(&self, kappa: NumStdDev) -> f64 {
        binomial_bounds::lower_bound(self.num_retained() as u64, self.theta(), kappa).unwrap_or(0.0)
    }

    /// Upper confidence bound at `kappa` standard deviations.
    fn upper_bound(&self, kappa: NumStdDev) -> f64 {
        binomial_bounds::upper_bound(self.num_retained() as u64, self.theta(), kappa, self.is_empty()).unwrap_or(0.0)
    }
}
