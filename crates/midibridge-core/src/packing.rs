//! Bit-width conversion between 8-bit bytes and 7-bit SysEx units.
//!
//! SysEx payloads may only carry values in `0..=0x7F`. Outgoing bytes are
//! regrouped into 7-bit units (the final partial group zero-padded), incoming
//! units are regrouped into bytes (a trailing partial group is padding and is
//! dropped). Packing `n` bytes yields `ceil(8n / 7)` units and unpacking those
//! yields exactly `n` bytes again, so field lengths never travel on the wire.

/// Largest value representable in a 24-bit protocol field.
pub const MAX_U24: u32 = 0x00FF_FFFF;

/// Units produced by packing a 24-bit integer.
pub const U24_UNITS: usize = 4;

/// Regroup an MSB-first bitstream of `bits_from`-wide values into `bits_to`-wide values.
///
/// Only the low `bits_from` bits of each input value are read. When `flush_partial`
/// is set, leftover bits are zero-padded into one final value; otherwise they are
/// discarded.
pub fn repack(input: &[u8], bits_from: u32, bits_to: u32, flush_partial: bool) -> Vec<u8> {
    debug_assert!((1..=8).contains(&bits_from) && (1..=8).contains(&bits_to));

    let in_mask: u32 = (1 << bits_from) - 1;
    let out_mask: u32 = (1 << bits_to) - 1;
    let total_bits = input.len() * bits_from as usize;
    let mut out = Vec::with_capacity(total_bits.div_ceil(bits_to as usize));

    let mut acc: u32 = 0;
    let mut acc_bits: u32 = 0;

    for &value in input {
        acc = (acc << bits_from) | (u32::from(value) & in_mask);
        acc_bits += bits_from;

        while acc_bits >= bits_to {
            acc_bits -= bits_to;
            out.push(((acc >> acc_bits) & out_mask) as u8);
        }
        // Keep only the bits that have not been emitted yet
        acc &= (1 << acc_bits) - 1;
    }

    if flush_partial && acc_bits > 0 {
        out.push(((acc << (bits_to - acc_bits)) & out_mask) as u8);
    }

    out
}

/// Pack 8-bit bytes into 7-bit units.
#[inline]
pub fn pack(bytes: &[u8]) -> Vec<u8> {
    repack(bytes, 8, 7, true)
}

/// Unpack 7-bit units back into 8-bit bytes.
#[inline]
pub fn unpack(units: &[u8]) -> Vec<u8> {
    repack(units, 7, 8, false)
}

/// Number of units needed to carry `byte_len` packed bytes.
#[inline]
pub fn packed_len(byte_len: usize) -> usize {
    (byte_len * 8).div_ceil(7)
}

/// Pack a 24-bit value as 3 big-endian bytes (4 units).
pub fn pack_u24(value: u32) -> Vec<u8> {
    debug_assert!(value <= MAX_U24);
    let [_, b0, b1, b2] = value.to_be_bytes();
    pack(&[b0, b1, b2])
}

/// Big-endian bytes of a 24-bit value, as covered by the checksum.
#[inline]
pub fn u24_bytes(value: u32) -> [u8; 3] {
    let [_, b0, b1, b2] = value.to_be_bytes();
    [b0, b1, b2]
}

/// Decode 3 big-endian bytes into a 24-bit value.
#[inline]
pub fn u24_from_bytes(bytes: [u8; 3]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}
