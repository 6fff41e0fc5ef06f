//! Checksum helpers shared by the per-family wire protocols (§4.3, §6).
//!
//! Grounded on `original_source/src/checksum.c` (not kept in the retrieval
//! pack's file list but referenced throughout `suunto_*`/`reefnet_*`): XOR
//! and additive checksums are plain byte folds; CRC-CCITT (XModem variant,
//! poly 0x1021, init 0xFFFF, no reflect) is the one used by Reefnet's
//! Sensus Pro and Sensus Ultra families.

use crc::{Algorithm, Crc};

/// CRC-CCITT (XModem), as used by `checksum_crc_ccitt_uint16` in the
/// original sources.
const CRC_CCITT: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0xFFFF,
    refin: false,
    refout: false,
    xorout: 0x0000,
    check: 0x29B1,
    residue: 0x0000,
};

pub fn crc_ccitt_uint16(data: &[u8]) -> u16 {
    Crc::<u16>::new(&CRC_CCITT).checksum(data)
}

/// `checksum_xor_uint8`: fold every byte through XOR starting from `init`.
pub fn xor_u8(data: &[u8], init: u8) -> u8 {
    data.iter().fold(init, |acc, &b| acc ^ b)
}

/// `checksum_add_uint8`: wrapping byte sum starting from `init`.
pub fn add_u8(data: &[u8], init: u8) -> u8 {
    data.iter().fold(init, |acc, &b| acc.wrapping_add(b))
}

/// `checksum_add_uint16`: wrapping little-endian u16 sum starting from `init`.
pub fn add_u16_le(data: &[u8], init: u16) -> u16 {
    data.iter().fold(init, |acc, &b| acc.wrapping_add(b as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_fold_matches_scenario_s2() {
        // Spec S2: request [05 00 02 00 04], XOR = 03.
        assert_eq!(xor_u8(&[0x05, 0x00, 0x02, 0x00, 0x04], 0x00), 0x03);
    }

    #[test]
    fn crc_ccitt_check_vector() {
        assert_eq!(crc_ccitt_uint16(b"123456789"), 0x29B1);
    }

    #[test]
    fn add_u8_wraps() {
        assert_eq!(add_u8(&[0xFF, 0x02], 0x00), 0x01);
    }
}
