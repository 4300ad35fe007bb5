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

//! The preamble / binary wire format (C3): a deterministic decoder state
//! machine over `(serial_version, preLongs, flags.empty, flags.singleItem)`,
//! shared by `ThetaSketch`, `CompactThetaSketch`, `ThetaUnion` and
//! `ThetaIntersection` so that every caller of "decode whatever bytes I was
//! handed" goes through one place.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::theta::hash_table::MAX_THETA;

/// Current serialization version
pub const SERIAL_VERSION: u8 = 3;

pub const FAMILY_ALPHA: u8 = 1;
pub const FAMILY_QUICKSELECT: u8 = 2;
pub const FAMILY_COMPACT: u8 = 3;
pub const FAMILY_UNION: u8 = 4;
pub const FAMILY_INTERSECTION: u8 = 5;
pub const FAMILY_ANOTB: u8 = 6;

pub const PRE_LONGS_EMPTY_OR_SINGLE: u8 = 1;
pub const PRE_LONGS_EXACT_COMPACT: u8 = 2;
pub const PRE_LONGS_ESTIMATING: u8 = 3;
pub const PRE_LONGS_UNION: u8 = 4;

// Flags (byte 5) - bit masks
pub const FLAG_IS_BIG_ENDIAN: u8 = 1 << 0;
pub const FLAG_IS_READ_ONLY: u8 = 1 << 1;
pub const FLAG_IS_EMPTY: u8 = 1 << 2;
pub const FLAG_IS_COMPACT: u8 = 1 << 3;
pub const FLAG_IS_ORDERED: u8 = 1 << 4;
pub const FLAG_HAS_SINGLE_ITEM: u8 = 1 << 5;
/// Not part of the upstream format; this crate's own extension marking the
/// optional compressed compact codec (§4.6), using an otherwise-unused
/// flag bit.
pub const FLAG_IS_COMPRESSED: u8 = 1 << 6;

/// Size of a single hash entry in bytes (u64)
pub const HASH_SIZE_BYTES: usize = 8;
/// Reserved IEEE-754 bit pattern for `p = 1.0f32`, written into the
/// otherwise-unused p/padding word of compact (non-update) forms.
pub const DEFAULT_P_FLOAT_BITS: u32 = 0x3f80_0000;

/// The normalized result of decoding any supported theta-family blob,
/// regardless of whether it originated from an `UpdateSketch`, a
/// `CompactThetaSketch`, or a set-operator's own serialized state.
#[derive(Debug, Clone)]
pub struct DecodedSketch {
    pub family_id: u8,
    pub serial_version: u8,
    pub lg_resize: u8,
    pub lg_nom_longs: u8,
    pub lg_arr_longs: u8,
    pub seed_hash: u16,
    pub p: f32,
    pub theta: u64,
    pub is_empty: bool,
    pub is_ordered: bool,
    pub is_single_item: bool,
    pub entries: Vec<u64>,
}

fn require(bytes: &[u8], len: usize, tag: &'static str) -> Result<(), Error> {
    if bytes.len() < len {
        Err(Error::insufficient_data(tag))
    } else {
        Ok(())
    }
}

/// Decodes the common 8-byte header plus whatever extension the
/// `(serial_version, preLongs, flags)` combination implies, producing the
/// retained-hash set for any supported theta-family blob.
///
/// `seed` is used only to synthesize `seed_hash` for serVer-1 blobs, which
/// predate the seed-hash field; for serVer 2/3 the stored seed hash is used
/// as-is (callers compare it against their own expected seed hash).
pub fn decode_any(bytes: &[u8], seed: u64) -> Result<DecodedSketch, Error> {
    require(bytes, 8, "preamble")?;

    let byte0 = bytes[0];
    let pre_longs = byte0 & 0x3f;
    let lg_resize = byte0 >> 6;
    let serial_version = bytes[1];
    let family_id = bytes[2];
    let lg_nom_longs = bytes[3];
    let lg_arr_longs = bytes[4];

    if !matches!(serial_version, 1 | 2 | 3) {
        return Err(Error::unsupported_serial_version(serial_version));
    }
    if !matches!(
        family_id,
        FAMILY_ALPHA | FAMILY_QUICKSELECT | FAMILY_COMPACT | FAMILY_UNION | FAMILY_INTERSECTION | FAMILY_ANOTB
    ) {
        return Err(Error::unrecognized_family(family_id));
    }

    let (flags, seed_hash) = if serial_version == 1 {
        (bytes[6], compute_seed_hash(seed))
    } else {
        let flags = bytes[5];
        let seed_hash = LittleEndian::read_u16(&bytes[6..8]);
        (flags, seed_hash)
    };

    if flags & FLAG_IS_BIG_ENDIAN != 0 {
        return Err(Error::argument("big-endian blobs are not supported by this reader"));
    }

    let is_empty = flags & FLAG_IS_EMPTY != 0;
    let is_ordered = flags & FLAG_IS_ORDERED != 0;

    if is_empty {
        return Ok(DecodedSketch {
            family_id,
            serial_version,
            lg_resize,
            lg_nom_longs,
            lg_arr_longs,
            seed_hash,
            p: 1.0,
            theta: MAX_THETA,
            is_empty: true,
            is_ordered: true,
            is_single_item: false,
            entries: Vec::new(),
        });
    }

    // Synthetic single-item acceptance (§9 Open Question): preLongs == 1
    // with exactly one trailing hash is treated as SingleItem even if the
    // flag bit was not set by the encoder.
    if pre_longs == PRE_LONGS_EMPTY_OR_SINGLE {
        require(bytes, 16, "single-item hash")?;
        let hash = LittleEndian::read_u64(&bytes[8..16]);
        return Ok(DecodedSketch {
            family_id,
            serial_version,
            lg_resize,
            lg_nom_longs,
            lg_arr_longs,
            seed_hash,
            p: 1.0,
            theta: MAX_THETA,
            is_empty: false,
            is_ordered: true,
            is_single_item: true,
            entries: vec![hash],
        });
    }

    require(bytes, 12, "curCount")?;
    let cur_count = LittleEndian::read_u32(&bytes[8..12]) as usize;
    let p = if serial_version == 1 {
        1.0
    } else {
        require(bytes, 16, "p")?;
        f32::from_bits(LittleEndian::read_u32(&bytes[12..16]))
    };

    let (theta, mut data_offset) = if pre_longs >= PRE_LONGS_ESTIMATING {
        require(bytes, 24, "theta")?;
        (LittleEndian::read_u64(&bytes[16..24]), 24)
    } else {
        (MAX_THETA, 16)
    };

    if pre_longs >= PRE_LONGS_UNION {
        data_offset += 8;
    }

    let entries = if flags & FLAG_IS_COMPRESSED != 0 {
        super::bitpack::decode_compressed_entries(&bytes[data_offset..], cur_count)?
    } else {
        require(bytes, data_offset + cur_count * HASH_SIZE_BYTES, "hash entries")?;
        let mut entries = Vec::with_capacity(cur_count);
        for i in 0..cur_count {
            let off = data_offset + i * HASH_SIZE_BYTES;
            entries.push(LittleEndian::read_u64(&bytes[off..off + HASH_SIZE_BYTES]));
        }
        entries
    };

    Ok(DecodedSketch {
        family_id,
        serial_version,
        lg_resize,
        lg_nom_longs,
        lg_arr_longs,
        seed_hash,
        p,
        theta,
        is_empty: false,
        is_ordered,
        is_single_item: false,
        entries,
    })
}

/// Writes the common 8-byte header.
#[allow(clippy::too_many_arguments)]
pub fn write_header(
    out: &mut Vec<u8>,
    pre_longs: u8,
    lg_resize: u8,
    family_id: u8,
    lg_nom_longs: u8,
    lg_arr_longs: u8,
    flags: u8,
    seed_hash: u16,
) {
    out.push((pre_longs & 0x3f) | (lg_resize << 6));
    out.push(SERIAL_VERSION);
    out.push(family_id);
    out.push(lg_nom_longs);
    out.push(lg_arr_longs);
    out.push(flags);
    let mut seed_hash_bytes = [0u8; 2];
    LittleEndian::write_u16(&mut seed_hash_bytes, seed_hash);
    out.extend_from_slice(&seed_hash_bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_masks() {
        // Verify flag masks are distinct powers of 2
        assert_eq!(FLAG_IS_BIG_ENDIAN, 1);
        assert_eq!(FLAG_IS_READ_ONLY, 2);
        assert_eq!(FLAG_IS_EMPTY, 4);
        assert_eq!(FLAG_IS_COMPACT, 8);
        assert_eq!(FLAG_IS_ORDERED, 16);
        assert_eq!(FLAG_HAS_SINGLE_ITEM, 32);
        assert_eq!(FLAG_IS_COMPRESSED, 64);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert!(decode_any(&[1, 2, 3], 0).is_err());
    }

    #[test]
    fn decode_rejects_unknown_serial_version() {
        let bytes = vec![1, 9, FAMILY_COMPACT, 0, 0, FLAG_IS_EMPTY | FLAG_IS_COMPACT, 0, 0];
        assert!(decode_any(&bytes, 0).is_err());
    }

    #[test]
    fn decode_rejects_unrecognized_family_id() {
        let mut bytes = vec![0u8; 8];
        bytes[0] = PRE_LONGS_EMPTY_OR_SINGLE;
        bytes[1] = SERIAL_VERSION;
        bytes[2] = 0; // no family is assigned id 0
        bytes[5] = FLAG_IS_EMPTY;
        let err = decode_any(&bytes, 0).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::VersionError);
    }

    #[test]
    fn decode_rejects_big_endian_flag() {
        let mut bytes = vec![0u8; 8];
        bytes[0] = PRE_LONGS_EMPTY_OR_SINGLE;
        bytes[1] = SERIAL_VERSION;
        bytes[2] = FAMILY_COMPACT;
        bytes[5] = FLAG_IS_BIG_ENDIAN;
        assert!(decode_any(&bytes, 0).is_err());
    }

    #[test]
    fn decode_empty_shape() {
        let mut bytes = vec![0u8; 8];
        bytes[0] = PRE_LONGS_EMPTY_OR_SINGLE;
        bytes[1] = SERIAL_VERSION;
        bytes[2] = FAMILY_COMPACT;
        bytes[5] = FLAG_IS_EMPTY | FLAG_IS_COMPACT | FLAG_IS_READ_ONLY | FLAG_IS_ORDERED;
        let decoded = decode_any(&bytes, 0).unwrap();
        assert!(decoded.is_empty);
        assert_eq!(decoded.theta, MAX_THETA);
        assert!(decoded.entries.is_empty());
    }
}
