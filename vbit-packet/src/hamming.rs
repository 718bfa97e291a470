//! Hamming 8/4 and 24/18 codes, and the odd parity used on text bytes.
//!
//! Bit layout follows ETS 300 706 §8. A Hamming 8/4 byte carries the data
//! nibble in bits 1, 3, 5 and 7 with protection bits in 0, 2, 4 and 6. A
//! Hamming 24/18 triplet is transmitted as three bytes, least significant
//! byte first, with parity bits at positions 1, 2, 4, 8, 16 and 24.

/// Hamming 8/4 codewords indexed by nibble.
pub const HAMMING_8_4: [u8; 16] = [
    0x15, 0x02, 0x49, 0x5E, 0x64, 0x73, 0x38, 0x2F,
    0xD0, 0xC7, 0x8C, 0x9B, 0xA1, 0xB6, 0xFD, 0xEA,
];

/// Marker in [`HAMMING_8_4_DECODE`] for bytes with an uncorrectable error.
const UNCORRECTABLE: u8 = 0xFF;

/// Decode table: every byte within one bit of a codeword maps to its nibble.
static HAMMING_8_4_DECODE: [u8; 256] = build_decode_table();

const fn build_decode_table() -> [u8; 256] {
    let mut table = [UNCORRECTABLE; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut nibble = 0;
        while nibble < 16 {
            let distance = (HAMMING_8_4[nibble] ^ byte as u8).count_ones();
            if distance <= 1 {
                table[byte] = nibble as u8;
                break;
            }
            nibble += 1;
        }
        byte += 1;
    }
    table
}

/// Hamming 8/4 encode the low nibble of `value`.
#[inline]
pub fn encode_8_4(value: u8) -> u8 {
    HAMMING_8_4[(value & 0x0F) as usize]
}

/// Decode a Hamming 8/4 byte, correcting a single bit error.
///
/// Returns `None` when two bits are in error.
#[inline]
pub fn decode_8_4(byte: u8) -> Option<u8> {
    match HAMMING_8_4_DECODE[byte as usize] {
        UNCORRECTABLE => None,
        nibble => Some(nibble),
    }
}

/// Bit positions (1-based) of the 18 data bits inside a triplet.
const DATA_POSITIONS: [u32; 18] = [3, 5, 6, 7, 9, 10, 11, 12, 13, 14, 15, 17, 18, 19, 20, 21, 22, 23];

/// Hamming 24/18 encode an 18-bit value into three transmission bytes.
///
/// Bits above the 18th are ignored.
pub fn encode_24_18(value: u32) -> [u8; 3] {
    let mut word: u32 = 0;
    for (i, position) in DATA_POSITIONS.iter().enumerate() {
        if value & (1 << i) != 0 {
            word |= 1 << (position - 1);
        }
    }

    // P1..P5 give odd parity over the positions sharing their bit.
    for p in 0..5 {
        let mask = coverage_mask(p);
        if (word & mask).count_ones() % 2 == 0 {
            word |= 1 << ((1 << p) - 1);
        }
    }

    // P6 gives odd parity over the whole word.
    if word.count_ones() % 2 == 0 {
        word |= 1 << 23;
    }

    [word as u8, (word >> 8) as u8, (word >> 16) as u8]
}

/// Decode a Hamming 24/18 triplet, correcting a single bit error.
///
/// Returns `None` when the error is not correctable.
pub fn decode_24_18(bytes: [u8; 3]) -> Option<u32> {
    let mut word = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;

    let mut syndrome = 0u32;
    for p in 0..5 {
        if (word & coverage_mask(p)).count_ones() % 2 == 0 {
            syndrome |= 1 << p;
        }
    }
    let overall_ok = word.count_ones() % 2 == 1;

    match (syndrome, overall_ok) {
        (0, true) => {}
        // Only P6 is wrong.
        (0, false) => word ^= 1 << 23,
        (s, false) if s <= 23 => word ^= 1 << (s - 1),
        _ => return None,
    }

    let mut value = 0;
    for (i, position) in DATA_POSITIONS.iter().enumerate() {
        if word & (1 << (position - 1)) != 0 {
            value |= 1 << i;
        }
    }
    Some(value)
}

/// Mask of word bits (positions 1..=23) whose position has bit `p` set.
fn coverage_mask(p: u32) -> u32 {
    (1..=23u32)
        .filter(|position| position & (1 << p) != 0)
        .fold(0, |mask, position| mask | 1 << (position - 1))
}

/// Strip the top bit and set it again so the byte has odd parity.
#[inline]
pub fn odd_parity(byte: u8) -> u8 {
    let data = byte & 0x7F;
    if data.count_ones() % 2 == 0 {
        data | 0x80
    } else {
        data
    }
}

/// Apply odd parity to every byte of `bytes` in place.
pub fn apply_parity(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = odd_parity(*b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_8_4_round_trip() {
        for nibble in 0..16u8 {
            assert_eq!(decode_8_4(encode_8_4(nibble)), Some(nibble));
        }
    }

    #[test]
    fn test_8_4_single_bit_correction() {
        for nibble in 0..16u8 {
            let code = encode_8_4(nibble);
            for bit in 0..8 {
                assert_eq!(decode_8_4(code ^ (1 << bit)), Some(nibble));
            }
        }
    }

    #[test]
    fn test_8_4_double_error_detected() {
        let code = encode_8_4(0x5);
        assert_eq!(decode_8_4(code ^ 0x03), None);
    }

    #[test]
    fn test_8_4_zero_is_0x15() {
        assert_eq!(encode_8_4(0), 0x15);
        assert_eq!(encode_8_4(0x11), 0x02);
    }

    #[test]
    fn test_24_18_round_trip_and_correction() {
        for value in [0u32, 1, 0x3FFFF, 0x2AAAA, 0x15555, 0x12345] {
            let code = encode_24_18(value);
            assert_eq!(decode_24_18(code), Some(value));
            for bit in 0..24 {
                let mut damaged = code;
                damaged[bit / 8] ^= 1 << (bit % 8);
                assert_eq!(decode_24_18(damaged), Some(value), "value {value:05X} bit {bit}");
            }
        }
    }

    #[test]
    fn test_24_18_double_error_detected() {
        let mut code = encode_24_18(0x00F0F);
        code[0] ^= 0x05;
        assert_eq!(decode_24_18(code), None);
    }

    #[test]
    fn test_odd_parity() {
        assert_eq!(odd_parity(b' '), 0x20);
        assert_eq!(odd_parity(b'A'), 0xC1);
        assert_eq!(odd_parity(0xC1), 0xC1);
        for b in 0..=255u8 {
            assert_eq!(odd_parity(b).count_ones() % 2, 1);
        }
    }
}
