//! CRC-16 used by every protocol message.
//!
//! Polynomial `0x6756`, register seeded with `0xFFFF`, processed LSB-first one bit
//! at a time, one's-complemented and byte-swapped at the end. Peers compare the
//! exact value, so the algorithm must not change.

use crate::packing::pack;

const POLYNOMIAL: u16 = 0x6756;
const SEED: u16 = 0xFFFF;

/// Units occupied by the checksum field (16 bits packed 8 to 7).
pub const CHECKSUM_UNITS: usize = 3;

/// Compute the protocol checksum over unpacked payload bytes.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = SEED;

    for &byte in data {
        let mut byte = byte;
        for _ in 0..8 {
            if (crc ^ u16::from(byte)) & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            byte >>= 1;
        }
    }

    (!crc).swap_bytes()
}

/// Checksum field as transmitted: the CRC's big-endian bytes, packed to 3 units.
pub fn checksum_units(data: &[u8]) -> Vec<u8> {
    pack(&crc16(data).to_be_bytes())
}
