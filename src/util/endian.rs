//! Endian-tagged readers (§9: "the implementation must expose endian-tagged
//! readers, not rely on host layout").
//!
//! Grounded on `original_source/src/array.c`'s `array_uint16_le`,
//! `array_uint32_le`, `array_uint16_be` family of helpers.

/// Read a little-endian u16 at `offset`. Panics like the C original's
/// unchecked pointer arithmetic would if `offset + 2 > data.len()`; callers
/// are expected to have already validated blob length against a header
/// size before calling into per-field decoders (see `Parser` impls).
pub fn u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

pub fn u16_be(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub fn u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub fn u24_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([0, data[offset], data[offset + 1], data[offset + 2]])
}

pub fn u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_le_and_be() {
        let data = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(u16_le(&data, 0), 0x3412);
        assert_eq!(u16_be(&data, 0), 0x1234);
        assert_eq!(u32_le(&data, 0), 0x78563412);
        assert_eq!(u32_be(&data, 0), 0x12345678);
    }
}
