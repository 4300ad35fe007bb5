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

//! `CompactThetaSketch` (C6): the immutable, serialized-shape result of a
//! `ThetaSketch` or a set operator.
//!
//! The three wire shapes (Empty / SingleItem / General) are not modeled as
//! separate Rust types; a single struct covers all three, matching the
//! shapes purely through its field values (`entries.is_empty()` with
//! `is_empty == false` and exactly one entry is the SingleItem shape). This
//! keeps the hot path (estimate, iterate, re-serialize) free of dynamic
//! dispatch, per the design note in §9 about specializing rather than
//! virtual-dispatching sketch representations.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::ThetaSketchView;
use crate::theta::bitpack;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::serialization::DEFAULT_P_FLOAT_BITS;
use crate::theta::serialization::FAMILY_COMPACT;
use crate::theta::serialization::FLAG_HAS_SINGLE_ITEM;
use crate::theta::serialization::FLAG_IS_COMPACT;
use crate::theta::serialization::FLAG_IS_COMPRESSED;
use crate::theta::serialization::FLAG_IS_EMPTY;
use crate::theta::serialization::FLAG_IS_ORDERED;
use crate::theta::serialization::FLAG_IS_READ_ONLY;
use crate::theta::serialization::HASH_SIZE_BYTES;
use crate::theta::serialization::PRE_LONGS_EMPTY_OR_SINGLE;
use crate::theta::serialization::PRE_LONGS_ESTIMATING;
use crate::theta::serialization::PRE_LONGS_EXACT_COMPACT;
use crate::theta::serialization::decode_any;
use crate::theta::serialization::write_header;

/// An immutable, serialized-form theta sketch: Empty, SingleItem, or
/// General, ordered or unordered.
#[derive(Debug, Clone)]
pub struct CompactThetaSketch {
    entries: Vec<u64>,
    theta: u64,
    seed_hash: u16,
    is_ordered: bool,
    is_empty: bool,
}

impl CompactThetaSketch {
    pub(crate) fn from_parts(entries: Vec<u64>, theta: u64, seed_hash: u16, is_ordered: bool, is_empty: bool) -> Self {
        // Empty and single-item sketches are always theta == MAX_THETA and
        // (for single-item) always reported ordered, regardless of the
        // caller's `ordered` request (spec §4.5).
        let (theta, is_ordered) = if is_empty {
            (MAX_THETA, true)
        } else if entries.len() <= 1 {
            (MAX_THETA, true)
        } else {
            (theta, is_ordered)
        };
        Self { entries, theta, seed_hash, is_ordered, is_empty }
    }

    /// Re-derives a compact sketch from `self`, honoring `ordered` for the
    /// General shape (Empty/SingleItem are unaffected, per spec §4.5/§4.6).
    pub fn compact(&self, ordered: bool) -> CompactThetaSketch {
        let mut entries = self.entries.clone();
        if ordered {
            entries.sort_unstable();
        }
        Self::from_parts(entries, self.theta, self.seed_hash, ordered, self.is_empty)
    }

    /// Builds an Empty compact sketch with the given seed hash.
    pub fn empty(seed_hash: u16) -> Self {
        Self { entries: Vec::new(), theta: MAX_THETA, seed_hash, is_ordered: true, is_empty: true }
    }

    fn shape(&self) -> Shape {
        if self.is_empty {
            Shape::Empty
        } else if self.entries.len() == 1 {
            Shape::SingleItem
        } else {
            Shape::General
        }
    }

    /// Serializes in the current (serVer 3) compact layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.shape() {
            Shape::Empty => {
                write_header(&mut out, PRE_LONGS_EMPTY_OR_SINGLE, 0, FAMILY_COMPACT, 0, 0, FLAG_IS_EMPTY | FLAG_IS_COMPACT | FLAG_IS_READ_ONLY | FLAG_IS_ORDERED, self.seed_hash);
            }
            Shape::SingleItem => {
                write_header(
                    &mut out,
                    PRE_LONGS_EMPTY_OR_SINGLE,
                    0,
                    FAMILY_COMPACT,
                    0,
                    0,
                    FLAG_IS_COMPACT | FLAG_IS_READ_ONLY | FLAG_IS_ORDERED | FLAG_HAS_SINGLE_ITEM,
                    self.seed_hash,
                );
                let mut hash_bytes = [0u8; HASH_SIZE_BYTES];
                LittleEndian::write_u64(&mut hash_bytes, self.entries[0]);
                out.extend_from_slice(&hash_bytes);
            }
            Shape::General => {
                let is_estimating = self.is_estimation_mode();
                let pre_longs = if is_estimating { PRE_LONGS_ESTIMATING } else { PRE_LONGS_EXACT_COMPACT };
                let mut flags = FLAG_IS_COMPACT | FLAG_IS_READ_ONLY;
                if self.is_ordered {
                    flags |= FLAG_IS_ORDERED;
                }
                write_header(&mut out, pre_longs, 0, FAMILY_COMPACT, 0, 0, flags, self.seed_hash);

                let mut tail = [0u8; 8];
                LittleEndian::write_u32(&mut tail[0..4], self.entries.len() as u32);
                LittleEndian::write_u32(&mut tail[4..8], DEFAULT_P_FLOAT_BITS);
                out.extend_from_slice(&tail);

                if is_estimating {
                    let mut theta_bytes = [0u8; 8];
                    LittleEndian::write_u64(&mut theta_bytes, self.theta);
                    out.extend_from_slice(&theta_bytes);
                }

                for &hash in &self.entries {
                    let mut hash_bytes = [0u8; HASH_SIZE_BYTES];
                    LittleEndian::write_u64(&mut hash_bytes, hash);
                    out.extend_from_slice(&hash_bytes);
                }
            }
        }
        out
    }

    /// Serializes using the bit-packed delta codec (§4.6). Only the
    /// General, ordered shape benefits from compression; Empty/SingleItem
    /// fall back to [`to_bytes`](Self::to_bytes) since there is nothing to
    /// compress.
    pub fn to_bytes_compressed(&self) -> Vec<u8> {
        if !matches!(self.shape(), Shape::General) {
            return self.to_bytes();
        }
        let ordered = self.compact(true);
        let is_estimating = ordered.is_estimation_mode();
        let pre_longs = if is_estimating { PRE_LONGS_ESTIMATING } else { PRE_LONGS_EXACT_COMPACT };
        let mut out = Vec::new();
        write_header(
            &mut out,
            pre_longs,
            0,
            FAMILY_COMPACT,
            0,
            0,
            FLAG_IS_COMPACT | FLAG_IS_READ_ONLY | FLAG_IS_ORDERED | FLAG_IS_COMPRESSED,
            ordered.seed_hash,
        );
        let mut tail = [0u8; 8];
        LittleEndian::write_u32(&mut tail[0..4], ordered.entries.len() as u32);
        LittleEndian::write_u32(&mut tail[4..8], DEFAULT_P_FLOAT_BITS);
        out.extend_from_slice(&tail);
        if is_estimating {
            let mut theta_bytes = [0u8; 8];
            LittleEndian::write_u64(&mut theta_bytes, ordered.theta);
            out.extend_from_slice(&theta_bytes);
        }
        out.extend_from_slice(&bitpack::encode_compressed_entries(&ordered.entries));
        out
    }

    /// Decodes a blob written by [`to_bytes`](Self::to_bytes) or
    /// [`to_bytes_compressed`](Self::to_bytes_compressed), using the
    /// default seed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_bytes_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Alias for [`from_bytes`](Self::from_bytes), matching the spec's
    /// `heapify`/`wrap` naming for constructing an owned sketch from bytes.
    pub fn heapify(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        Self::from_bytes_with_seed(bytes, seed)
    }

    /// Alias for [`from_bytes`](Self::from_bytes): this crate always copies
    /// the decoded hashes rather than keeping a borrowed view, so `wrap`
    /// and `heapify` coincide here. See `DESIGN.md` for the read-only-view
    /// type that `ReadOnlyError` is reserved for.
    pub fn wrap(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        Self::from_bytes_with_seed(bytes, seed)
    }

    pub fn from_bytes_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let decoded = decode_any(bytes, seed)?;
        let expected_seed_hash = compute_seed_hash(seed);
        let seed_hash = if decoded.is_empty && decoded.seed_hash == 0 {
            expected_seed_hash
        } else {
            decoded.seed_hash
        };
        if !decoded.is_empty && seed_hash != expected_seed_hash {
            return Err(Error::seed_mismatch(expected_seed_hash, seed_hash));
        }
        Ok(Self::from_parts(decoded.entries, decoded.theta, seed_hash, decoded.is_ordered, decoded.is_empty))
    }

    pub fn is_ordered(&self) -> bool {
        self.is_ordered
    }
}

enum Shape {
    Empty,
    SingleItem,
    General,
}

impl ThetaSketchView for CompactThetaSketch {
    fn is_empty(&self) -> bool {
        self.is_empty
    }

    fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    fn num_retained(&self) -> usize {
        self.entries.len()
    }

    fn theta64(&self) -> u64 {
        self.theta
    }

    fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    fn iter_hashes(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.entries.iter().copied())
    }
}
