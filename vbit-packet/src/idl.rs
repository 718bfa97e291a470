//! Independent data line packets, format A (ETS 300 708 §6.5).
//!
//! ```text
//! +----+-----+--------+------+------+------+-----------------+-------+
//! | FT | IAL | SPA    | RI   | CI   | DL   | user data / AA  | CRC   |
//! | H84| H84 | 0..7xH | opt. | opt. | opt. | stuffed         | 2     |
//! +----+-----+--------+------+------+------+-----------------+-------+
//!   5    6     7..                                         43    44
//! ```

use crate::crc::IdlCrc;
use crate::hamming::encode_8_4;
use crate::packet::{Packet, PACKET_SIZE};
use crate::types::Coding;

/// Highest datachannel number.
pub const MAX_CHANNEL: u8 = 15;
/// Longest service packet address in nibbles.
pub const MAX_ADDRESS_LENGTH: u8 = 7;

const CRC_START: usize = PACKET_SIZE - 2;
const FILL: u8 = 0xAA;
/// Identical 0x00/0xFF bytes after which a dummy byte is inserted.
const STUFFING_RUN: usize = 7;

/// How the continuity indicator is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// CI byte sent in the packet; the CRC bytes hold the plain CRC.
    Explicit(u8),
    /// No CI byte; the CRC bytes are chosen so the receiver's CRC register
    /// ends at `ci << 8`.
    Implicit(u8),
}

impl Default for Continuity {
    fn default() -> Self {
        Continuity::Implicit(0)
    }
}

/// Input for one IDL format A packet.
#[derive(Debug, Clone, Default)]
pub struct IdlA<'a> {
    /// Service packet address, `address_length` nibbles sent low first.
    pub address: u32,
    pub address_length: u8,
    /// Repeat indicator byte, if sent.
    pub repeat: Option<u8>,
    pub continuity: Continuity,
    /// Send a data length byte.
    pub explicit_length: bool,
    pub data: &'a [u8],
}

impl Packet {
    /// Build an IDL format A packet on `channel` (0..=15).
    ///
    /// Returns how many bytes of `data` fitted. The caller sends the rest in
    /// a later packet.
    pub fn idl_a(&mut self, channel: u8, idl: &IdlA<'_>) -> usize {
        let channel = channel & MAX_CHANNEL;
        self.reset(channel & 0x07, 30 + (channel >> 3), Coding::Raw8);

        let explicit_ci = matches!(idl.continuity, Continuity::Explicit(_));
        let address_length = idl.address_length.min(MAX_ADDRESS_LENGTH);

        let b = &mut self.bytes;
        let mut format_type = 0u8;
        if explicit_ci {
            format_type |= 0x04;
        }
        if idl.explicit_length {
            format_type |= 0x08;
        }
        b[5] = encode_8_4(format_type);
        b[6] = encode_8_4(address_length | if idl.repeat.is_some() { 0x08 } else { 0 });

        let mut p = 7;
        for i in 0..address_length as u32 {
            b[p] = encode_8_4((idl.address >> (i * 4)) as u8);
            p += 1;
        }
        if let Some(repeat) = idl.repeat {
            b[p] = repeat;
            p += 1;
        }
        if let Continuity::Explicit(ci) = idl.continuity {
            b[p] = ci;
            p += 1;
        }
        let length_at = if idl.explicit_length {
            p += 1;
            Some(p - 1)
        } else {
            None
        };

        let data_start = p;
        let mut consumed = 0;
        let mut run = 0usize;
        let mut last = None;
        while consumed < idl.data.len() && p < CRC_START {
            let byte = idl.data[consumed];
            let stuffable = byte == 0x00 || byte == 0xFF;
            let completes_run = stuffable && last == Some(byte) && run == STUFFING_RUN - 1;
            if completes_run && p + 2 > CRC_START {
                break;
            }
            b[p] = byte;
            p += 1;
            consumed += 1;

            if completes_run {
                b[p] = FILL;
                p += 1;
                run = 0;
                last = None;
            } else if stuffable && last == Some(byte) {
                run += 1;
            } else if stuffable {
                run = 1;
                last = Some(byte);
            } else {
                run = 0;
                last = None;
            }
        }

        if let Some(at) = length_at {
            b[at] = ((p - data_start) & 0x3F) as u8;
        }
        b[p..CRC_START].fill(FILL);

        let mut crc = IdlCrc::new();
        crc.update_slice(&b[5..CRC_START]);
        let check = match idl.continuity {
            Continuity::Explicit(_) => {
                let value = crc.value();
                [value as u8, (value >> 8) as u8]
            }
            Continuity::Implicit(ci) => crc.bytes_for_target((ci as u16) << 8),
        };
        b[CRC_START..].copy_from_slice(&check);

        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamming::decode_8_4;

    #[test]
    fn test_idl_address_fields() {
        let mut packet = Packet::new();
        let idl = IdlA {
            address: 0x0321,
            address_length: 3,
            repeat: Some(0x05),
            continuity: Continuity::Explicit(9),
            explicit_length: true,
            data: b"AB",
        };
        assert_eq!(packet.idl_a(9, &idl), 2);
        let b = packet.bytes();
        assert_eq!(packet.magazine(), 1);
        assert_eq!(packet.row(), 31);
        assert_eq!(decode_8_4(b[5]), Some(0x0C));
        assert_eq!(decode_8_4(b[6]), Some(0x0B));
        assert_eq!(decode_8_4(b[7]), Some(1));
        assert_eq!(decode_8_4(b[8]), Some(2));
        assert_eq!(decode_8_4(b[9]), Some(3));
        assert_eq!(b[10], 0x05);
        assert_eq!(b[11], 9);
        assert_eq!(b[12], 2);
        assert_eq!(&b[13..15], b"AB");
        assert!(b[15..43].iter().all(|&x| x == FILL));
    }

    #[test]
    fn test_idl_explicit_crc() {
        let mut packet = Packet::new();
        let idl = IdlA {
            continuity: Continuity::Explicit(0),
            data: b"hello",
            ..Default::default()
        };
        packet.idl_a(4, &idl);
        let b = packet.bytes();
        let mut crc = IdlCrc::new();
        crc.update_slice(&b[5..43]);
        assert_eq!(b[43], crc.value() as u8);
        assert_eq!(b[44], (crc.value() >> 8) as u8);
    }

    #[test]
    fn test_idl_implicit_continuity() {
        for ci in [0u8, 1, 0x7F, 0xFF] {
            let mut packet = Packet::new();
            let idl = IdlA {
                continuity: Continuity::Implicit(ci),
                data: b"data",
                ..Default::default()
            };
            packet.idl_a(1, &idl);
            let mut crc = IdlCrc::new();
            crc.update_slice(&packet.bytes()[5..45]);
            assert_eq!(crc.value(), (ci as u16) << 8);
        }
    }

    #[test]
    fn test_idl_byte_stuffing() {
        let mut packet = Packet::new();
        let data = [0x00u8; 10];
        let idl = IdlA {
            explicit_length: true,
            data: &data,
            ..Default::default()
        };
        assert_eq!(packet.idl_a(1, &idl), 10);
        let b = packet.bytes();
        // FT, IAL, DL, then data from byte 8.
        assert_eq!(b[7], 11);
        assert_eq!(&b[8..15], &[0u8; 7]);
        assert_eq!(b[15], FILL);
        assert_eq!(&b[16..19], &[0u8; 3]);
        assert_eq!(b[19], FILL);
    }

    #[test]
    fn test_idl_no_stuffing_for_other_values() {
        let mut packet = Packet::new();
        let data = [0x11u8; 9];
        let idl = IdlA {
            data: &data,
            ..Default::default()
        };
        packet.idl_a(1, &idl);
        assert_eq!(&packet.bytes()[7..16], &data);
    }

    #[test]
    fn test_idl_truncation() {
        let mut packet = Packet::new();
        let data = [0x42u8; 64];
        let idl = IdlA {
            data: &data,
            ..Default::default()
        };
        // 36 bytes between the IAL byte and the CRC.
        assert_eq!(packet.idl_a(2, &idl), 36);
    }

    #[test]
    fn test_idl_stuffing_stops_when_dummy_does_not_fit() {
        let mut packet = Packet::new();
        let mut data = vec![0x42u8; 29];
        data.extend_from_slice(&[0xFF; 8]);
        let idl = IdlA {
            data: &data,
            ..Default::default()
        };
        // 29 + 6 bytes fill 35 of 36; the seventh 0xFF would need a dummy.
        assert_eq!(packet.idl_a(2, &idl), 35);
        assert_eq!(packet.bytes()[42], FILL);
    }
}
