//! CRC-32 used for the packet envelope checksum.
//!
//! The radio hardware does not checksum the envelope for us (serial radios
//! in particular deliver raw bytes), so the stack computes a reflected
//! CRC-32 (polynomial `0xEDB88320`) over the covered part of each packet.

/// Computes the CRC-32 of `bytes`.
///
/// Bitwise implementation; the egress path hashes at most one packet per
/// call, so a lookup table isn't worth its footprint here.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let lsb = crc & 1;
            crc >>= 1;
            if lsb != 0 {
                crc ^= 0xEDB8_8320;
            }
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        // Standard CRC-32 check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty() {
        assert_eq!(crc32(&[]), 0);
    }
}
