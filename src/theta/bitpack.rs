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

//! Bit-packing codec (C2): pack/unpack 1-63-bit integers into a byte
//! buffer, plus an 8-hash block fast path, and the compressed compact-sketch
//! codec (C6 §4.6) built on top of it.

use crate::error::Error;

/// Writes the low `bits` bits of `value` at bit position
/// `byte_off * 8 + bit_off`. `bit_off` must be in `0..8` and `bits` in
/// `1..=63`. Returns the `(byte_off, bit_off)` position just past the
/// written field.
///
/// # Panics
///
/// Panics if `buf` is not large enough to hold the written field.
pub fn pack(value: u64, bits: u8, buf: &mut [u8], byte_off: usize, bit_off: usize) -> (usize, usize) {
    debug_assert!((1..=63).contains(&bits), "bits out of range: {bits}");
    debug_assert!(bit_off < 8, "bit_off out of range: {bit_off}");

    let mask = (1u64 << bits) - 1;
    let shifted = ((value & mask) as u128) << bit_off;
    let total_bits = bit_off + bits as usize;
    let nbytes = total_bits.div_ceil(8);
    for i in 0..nbytes {
        buf[byte_off + i] |= ((shifted >> (i * 8)) & 0xff) as u8;
    }

    (byte_off + total_bits / 8, total_bits % 8)
}

/// The exact inverse of [`pack`]: reads `bits` bits starting at
/// `byte_off * 8 + bit_off` and returns `(value, new_byte_off, new_bit_off)`.
pub fn unpack(buf: &[u8], byte_off: usize, bit_off: usize, bits: u8) -> (u64, usize, usize) {
    debug_assert!((1..=63).contains(&bits), "bits out of range: {bits}");
    debug_assert!(bit_off < 8, "bit_off out of range: {bit_off}");

    let total_bits = bit_off + bits as usize;
    let nbytes = total_bits.div_ceil(8);
    let mut raw: u128 = 0;
    for i in 0..nbytes {
        raw |= (buf[byte_off + i] as u128) << (i * 8);
    }
    let mask = (1u64 << bits) - 1;
    let value = ((raw >> bit_off) as u64) & mask;

    (value, byte_off + total_bits / 8, total_bits % 8)
}

/// Packs exactly 8 integers with a fixed width, equivalent to eight calls
/// of [`pack`] with the canonical offset walk
/// `bit_off += bits; byte_off += bit_off / 8; bit_off %= 8`.
pub fn pack_block8(src: &[u64; 8], bits: u8, buf: &mut [u8], byte_off: usize, bit_off: usize) -> (usize, usize) {
    let mut byte_off = byte_off;
    let mut bit_off = bit_off;
    for &value in src {
        (byte_off, bit_off) = pack(value, bits, buf, byte_off, bit_off);
    }
    (byte_off, bit_off)
}

/// The exact inverse of [`pack_block8`].
pub fn unpack_block8(buf: &[u8], byte_off: usize, bit_off: usize, bits: u8) -> ([u64; 8], usize, usize) {
    let mut out = [0u64; 8];
    let mut byte_off = byte_off;
    let mut bit_off = bit_off;
    for slot in &mut out {
        let (value, next_byte, next_bit) = unpack(buf, byte_off, bit_off, bits);
        *slot = value;
        byte_off = next_byte;
        bit_off = next_bit;
    }
    (out, byte_off, bit_off)
}

/// Number of bits needed to represent `value` (0 for `value == 0`).
fn bit_width(value: u64) -> u8 {
    64 - value.leading_zeros() as u8
}

/// Encodes a strictly ascending slice of sketch hashes (each `< 2^63`) as
/// delta-from-previous values packed at a uniform bit width, per §4.6's
/// compressed compact codec. `entries` must already be sorted ascending;
/// this is the caller's invariant, not re-validated here.
///
/// Layout: `[bits_per_entry: u8][packed deltas, 8-at-a-time then scalar
/// remainder]`.
pub fn encode_compressed_entries(entries: &[u64]) -> Vec<u8> {
    if entries.is_empty() {
        return vec![0u8];
    }

    let mut max_delta = entries[0];
    let mut prev = 0u64;
    for &e in entries {
        max_delta = max_delta.max(e - prev);
        prev = e;
    }
    let bits = bit_width(max_delta).max(1).min(63);

    let total_bits = 8usize + entries.len() * bits as usize;
    let mut out = vec![0u8; 1 + total_bits.div_ceil(8)];
    out[0] = bits;

    let mut byte_off = 1usize;
    let mut bit_off = 0usize;
    let mut prev = 0u64;
    let mut chunks = entries.chunks_exact(8);
    for chunk in &mut chunks {
        let deltas: [u64; 8] = std::array::from_fn(|i| {
            let d = chunk[i] - prev;
            prev = chunk[i];
            d
        });
        (byte_off, bit_off) = pack_block8(&deltas, bits, &mut out, byte_off, bit_off);
    }
    for &e in chunks.remainder() {
        let delta = e - prev;
        prev = e;
        (byte_off, bit_off) = pack(delta, bits, &mut out, byte_off, bit_off);
    }

    out
}

/// Decodes `cur_count` hashes encoded by [`encode_compressed_entries`].
pub fn decode_compressed_entries(data: &[u8], cur_count: usize) -> Result<Vec<u64>, Error> {
    if data.is_empty() {
        return Err(Error::insufficient_data("compressed_entries_header"));
    }
    let bits = data[0];
    if cur_count == 0 {
        return Ok(Vec::new());
    }
    if bits == 0 || bits > 63 {
        return Err(Error::argument(format!("invalid compressed bit width {bits}")));
    }

    let total_bits = cur_count * bits as usize;
    let needed = 1 + total_bits.div_ceil(8);
    if data.len() < needed {
        return Err(Error::insufficient_data("compressed_entries"));
    }

    let mut entries = Vec::with_capacity(cur_count);
    let mut byte_off = 1usize;
    let mut bit_off = 0usize;
    let mut prev = 0u64;
    let mut remaining = cur_count;
    while remaining >= 8 {
        let (deltas, next_byte, next_bit) = unpack_block8(data, byte_off, bit_off, bits);
        byte_off = next_byte;
        bit_off = next_bit;
        for d in deltas {
            prev += d;
            entries.push(prev);
        }
        remaining -= 8;
    }
    for _ in 0..remaining {
        let (delta, next_byte, next_bit) = unpack(data, byte_off, bit_off, bits);
        byte_off = next_byte;
        bit_off = next_bit;
        prev += delta;
        entries.push(prev);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pack_unpack_single_value_at_offset_zero() {
        let mut buf = [0u8; 16];
        let (byte_off, bit_off) = pack(0x1f, 5, &mut buf, 0, 0);
        let (value, end_byte, end_bit) = unpack(&buf, 0, 0, 5);
        assert_eq!(value, 0x1f);
        assert_eq!((byte_off, bit_off), (end_byte, end_bit));
    }

    #[test]
    fn pack_unpack_crosses_byte_boundary() {
        let mut buf = [0u8; 16];
        // Write a 50-bit field starting 3 bits into the first byte.
        let value = 0x0003_ffff_ffff_ffffu64 & ((1u64 << 50) - 1);
        let (byte_off, bit_off) = pack(value, 50, &mut buf, 0, 3);
        let (decoded, _, _) = unpack(&buf, 0, 3, 50);
        assert_eq!(decoded, value);
        assert_eq!(byte_off, (3 + 50) / 8);
        assert_eq!(bit_off, (3 + 50) % 8);
    }

    #[test]
    fn pack_block8_matches_eight_scalar_calls() {
        let values: [u64; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
        let bits = 9u8;

        let mut block_buf = [0u8; 16];
        let block_end = pack_block8(&values, bits, &mut block_buf, 0, 0);

        let mut scalar_buf = [0u8; 16];
        let mut byte_off = 0;
        let mut bit_off = 0;
        for &v in &values {
            (byte_off, bit_off) = pack(v, bits, &mut scalar_buf, byte_off, bit_off);
        }

        assert_eq!(block_buf, scalar_buf);
        assert_eq!(block_end, (byte_off, bit_off));

        let (decoded, decoded_end) = {
            let (d, b, o) = unpack_block8(&block_buf, 0, 0, bits);
            (d, (b, o))
        };
        assert_eq!(decoded, values);
        assert_eq!(decoded_end, block_end);
    }

    #[test]
    fn compressed_entries_round_trip() {
        let entries = vec![10u64, 200, 300, 300_000, 5_000_000, 5_000_001, 9_000_000_000];
        let encoded = encode_compressed_entries(&entries);
        let decoded = decode_compressed_entries(&encoded, entries.len()).unwrap();
        assert_eq!(entries, decoded);
    }

    #[test]
    fn compressed_entries_empty() {
        let encoded = encode_compressed_entries(&[]);
        let decoded = decode_compressed_entries(&encoded, 0).unwrap();
        assert!(decoded.is_empty());
    }

    proptest! {
        #[test]
        fn pack_law_for_all_bit_widths(bits in 1u8..=63, raw in any::<u64>()) {
            let mask = (1u64 << bits) - 1;
            let value = raw & mask;
            let mut buf = [0u8; 16];
            let (_, _) = pack(value, bits, &mut buf, 0, 0);
            let (decoded, _, _) = unpack(&buf, 0, 0, bits);
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn pack_law_at_arbitrary_bit_offset(bits in 1u8..=32, bit_off in 0usize..8, raw in any::<u64>()) {
            let mask = (1u64 << bits) - 1;
            let value = raw & mask;
            let mut buf = [0u8; 16];
            pack(value, bits, &mut buf, 1, bit_off);
            let (decoded, _, _) = unpack(&buf, 1, bit_off, bits);
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn block8_round_trip(bits in 1u8..=32, values in proptest::array::uniform8(any::<u64>())) {
            let mask = (1u64 << bits) - 1;
            let masked: [u64; 8] = std::array::from_fn(|i| values[i] & mask);
            let mut buf = [0u8; 64];
            pack_block8(&masked, bits, &mut buf, 0, 0);
            let (decoded, _, _) = unpack_block8(&buf, 0, 0, bits);
            prop_assert_eq!(decoded, masked);
        }
    }
}
