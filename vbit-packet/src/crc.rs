//! Checksums carried inside teletext packets.
//!
//! - [`PageCrc`]: the page check word sent in X/27/0 (ETS 300 706 §9.6.1),
//!   generator x^16 + x^12 + x^9 + x^7 + 1, fed most significant bit first.
//! - [`IdlCrc`]: the IDL Format A CRC (ETS 300 708 §6.5), generator
//!   x^16 + x^9 + x^7 + x^4 + 1, fed least significant bit first.

/// Reflected IDL generator polynomial.
pub const IDL_POLYNOMIAL: u16 = 0x8940;

/// Running page check word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCrc(u16);

impl PageCrc {
    pub fn new() -> Self {
        Self(0)
    }

    /// Feed one byte, most significant bit first.
    pub fn update(&mut self, byte: u8) {
        let mut crc = self.0;
        let mut b = byte;
        for _ in 0..8 {
            let feedback = ((b >> 7) as u16 ^ (crc >> 6) ^ (crc >> 8) ^ (crc >> 11) ^ (crc >> 15)) & 1;
            crc = (crc << 1) | feedback;
            b <<= 1;
        }
        self.0 = crc;
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// Running IDL Format A CRC register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdlCrc(u16);

impl IdlCrc {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_value(value: u16) -> Self {
        Self(value)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Feed one byte, least significant bit first.
    pub fn update(&mut self, byte: u8) {
        self.0 = forward(self.0, byte);
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    /// The two bytes that, appended after the data fed so far, leave the
    /// register holding `target`.
    ///
    /// Appending `x` (low byte first) moves the register to
    /// `F16(state ^ x)`, where `F16` is sixteen zero-bit shifts. Undoing the
    /// shifts from `target` is the bit-reversed update applied twice with a
    /// zero byte.
    pub fn bytes_for_target(self, target: u16) -> [u8; 2] {
        let before = reverse(reverse(target, 0), 0);
        let x = self.0 ^ before;
        [x as u8, (x >> 8) as u8]
    }
}

fn forward(mut crc: u16, byte: u8) -> u16 {
    for i in 0..8 {
        let feedback = (crc ^ (byte >> i) as u16) & 1;
        crc >>= 1;
        if feedback != 0 {
            crc ^= IDL_POLYNOMIAL;
        }
    }
    crc
}

/// Inverse of [`forward`]: the register value before `byte` was fed.
fn reverse(mut crc: u16, byte: u8) -> u16 {
    for i in (0..8).rev() {
        let bit = ((byte >> i) & 1) as u16;
        // The top bit can only be set by the polynomial.
        let feedback = crc >> 15;
        if feedback != 0 {
            crc ^= IDL_POLYNOMIAL;
        }
        crc = (crc << 1) | (feedback ^ bit);
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idl_reverse_undoes_forward() {
        for start in [0u16, 1, 0x1234, 0xFFFF, 0x8940] {
            for byte in [0u8, 0x01, 0x80, 0xAA, 0xFF] {
                assert_eq!(reverse(forward(start, byte), byte), start);
            }
        }
    }

    #[test]
    fn test_idl_bytes_for_target() {
        let mut crc = IdlCrc::new();
        crc.update_slice(b"teletext data line");
        for target in [0x0000u16, 0x0100, 0x7F00, 0xFFFF] {
            let tail = crc.bytes_for_target(target);
            let mut check = crc;
            check.update_slice(&tail);
            assert_eq!(check.value(), target);
        }
    }

    #[test]
    fn test_page_crc_changes_with_content() {
        let mut a = PageCrc::new();
        a.update_slice(&[0x20; 64]);
        let mut b = PageCrc::new();
        b.update_slice(&[0x20; 63]);
        b.update(0x21);
        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn test_page_crc_single_bit() {
        // One set bit shifted in lands in the low bit.
        let mut crc = PageCrc::new();
        crc.update(0x01);
        assert_eq!(crc.value(), 0x0001);
    }
}
