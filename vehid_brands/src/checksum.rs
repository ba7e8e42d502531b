//! Per-brand frame checksums.
//!
//! Each `*_checksum` computes the value for a payload whose checksum field is
//! still unset; `*_ok` has the `Checksum` shape used by `CanParser` and
//! verifies a received frame; `seal_*` writes the field into an outbound
//! payload. Empty payloads never verify.

use crc::{Algorithm, CRC_8_SAE_J1850, Crc};

const CRC8_J1850: Crc<u8> = Crc::<u8>::new(&CRC_8_SAE_J1850);

const CRC_8_PEDAL: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0xD5,
    init: 0xFF,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x7C,
    residue: 0x00,
};

const CRC8_PEDAL: Crc<u8> = Crc::<u8>::new(&CRC_8_PEDAL);

/// Byte sum of length, address bytes and payload; stored in the last byte.
pub fn toyota_checksum(id: u32, data: &[u8]) -> u8 {
    let Some((_, body)) = data.split_last() else {
        return 0;
    };
    let mut s = data.len() as u32;
    let mut addr = id;
    while addr != 0 {
        s = s.wrapping_add(addr & 0xFF);
        addr >>= 8;
    }
    let s = body.iter().fold(s, |acc, b| acc.wrapping_add(u32::from(*b)));
    (s & 0xFF) as u8
}

pub fn toyota_ok(id: u32, data: &[u8]) -> bool {
    data.last().is_some_and(|&c| c == toyota_checksum(id, data))
}

pub fn seal_toyota(id: u32, data: &mut [u8]) {
    let c = toyota_checksum(id, data);
    if let Some(last) = data.last_mut() {
        *last = c;
    }
}

/// Nibble sum over address and payload; stored in the low nibble of the last
/// byte, whose high nibble (the rolling counter) is part of the sum.
pub fn honda_checksum(id: u32, data: &[u8]) -> u8 {
    let Some((&last, body)) = data.split_last() else {
        return 0;
    };
    let mut s: i32 = 0;
    let mut addr = id;
    while addr != 0 {
        s += (addr & 0xF) as i32;
        addr >>= 4;
    }
    for b in body.iter().copied().chain(std::iter::once(last >> 4)) {
        s += i32::from(b & 0xF) + i32::from(b >> 4);
    }
    s = 8 - s;
    if id > 0x7FF {
        s += 3;
    }
    (s & 0xF) as u8
}

pub fn honda_ok(id: u32, data: &[u8]) -> bool {
    data.last()
        .is_some_and(|&c| c & 0xF == honda_checksum(id, data))
}

pub fn seal_honda(id: u32, data: &mut [u8]) {
    let c = honda_checksum(id, data);
    if let Some(last) = data.last_mut() {
        *last = (*last & 0xF0) | c;
    }
}

/// CRC-8/SAE-J1850 over all bytes but the last.
pub fn chrysler_checksum(_id: u32, data: &[u8]) -> u8 {
    let Some((_, body)) = data.split_last() else {
        return 0;
    };
    CRC8_J1850.checksum(body)
}

pub fn chrysler_ok(id: u32, data: &[u8]) -> bool {
    data.last()
        .is_some_and(|&c| c == chrysler_checksum(id, data))
}

pub fn seal_chrysler(id: u32, data: &mut [u8]) {
    let c = chrysler_checksum(id, data);
    if let Some(last) = data.last_mut() {
        *last = c;
    }
}

/// CRC-8 (poly 0xD5, init 0xFF) over all bytes but the last, last-to-first.
/// Used by the comma pedal interceptor.
pub fn pedal_checksum(_id: u32, data: &[u8]) -> u8 {
    let Some((_, body)) = data.split_last() else {
        return 0;
    };
    let mut digest = CRC8_PEDAL.digest();
    for byte in body.iter().rev() {
        digest.update(std::slice::from_ref(byte));
    }
    digest.finalize()
}

pub fn seal_pedal(id: u32, data: &mut [u8]) {
    let c = pedal_checksum(id, data);
    if let Some(last) = data.last_mut() {
        *last = c;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::toyota_zeroes(0x2E4, [0x00, 0x00, 0x00, 0x00, 0x00], 0xEB)]
    #[case::toyota_lka(0x2E4, [0x80, 0x01, 0x2C, 0x00, 0x00], 0x98)]
    fn toyota_known_values(#[case] id: u32, #[case] data: [u8; 5], #[case] want: u8) {
        assert_eq!(toyota_checksum(id, &data), want);
    }

    #[test]
    fn honda_counts_the_counter_nibble() {
        let a = honda_checksum(0xE4, &[0, 0, 0, 0, 0x00]);
        let b = honda_checksum(0xE4, &[0, 0, 0, 0, 0x10]);
        assert_eq!(a, 6);
        assert_eq!(b, 5);
    }

    #[test]
    fn honda_extended_ids_are_offset() {
        assert_eq!(
            honda_checksum(0x800, &[0, 0x00]),
            (honda_checksum(0x008, &[0, 0x00]) + 3) & 0xF
        );
    }

    #[test]
    fn chrysler_zero_payload() {
        assert_eq!(chrysler_checksum(0x292, &[0, 0, 0, 0, 0, 0]), 0x10);
    }

    #[test]
    fn chrysler_matches_the_j1850_check_value() {
        assert_eq!(chrysler_checksum(0x292, b"123456789\0"), 0x4B);
    }

    #[test]
    fn pedal_reads_the_body_last_to_first() {
        assert_eq!(pedal_checksum(0x200, b"987654321\0"), 0x7C);
        assert_ne!(
            pedal_checksum(0x200, &[0x01, 0x02, 0x00]),
            pedal_checksum(0x200, &[0x02, 0x01, 0x00])
        );
    }

    #[test]
    fn empty_payloads_never_verify() {
        assert!(!toyota_ok(0x10, &[]));
        assert!(!honda_ok(0x10, &[]));
        assert!(!chrysler_ok(0x10, &[]));
    }

    proptest! {
        #[test]
        fn sealed_payloads_verify(id in 0u32..0x800, data in proptest::collection::vec(any::<u8>(), 1..8)) {
            let mut data = data;
            seal_toyota(id, &mut data);
            prop_assert!(toyota_ok(id, &data));
            seal_honda(id, &mut data);
            prop_assert!(honda_ok(id, &data));
            seal_chrysler(id, &mut data);
            prop_assert!(chrysler_ok(id, &data));
        }
    }
}
