//! Output containers for the packet stream.
//!
//! - Raw: 45-byte packets back to back.
//! - T42: the 42 bytes after the framing code.
//! - PES: teletext in MPEG-2 PES (EN 300 472), one PES packet per field.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::PacketError;
use crate::packet::PACKET_SIZE;

/// Bytes in a T42 line.
pub const T42_SIZE: usize = 42;
/// PES packets are padded to a multiple of this many bytes.
pub const PES_ALIGNMENT: usize = 184;

const PES_HEADER_SIZE: usize = 45;
const PES_UNIT_SIZE: usize = 46;
const DATA_IDENTIFIER: u8 = 0x10;
const PTS_MASK: u64 = (1 << 33) - 1;

/// EN 300 472 data unit identifiers.
pub mod data_unit {
    pub const TELETEXT: u8 = 0x02;
    pub const SUBTITLE: u8 = 0x03;
    pub const STUFFING: u8 = 0xFF;
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Raw,
    T42,
    Pes,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Raw => write!(f, "raw"),
            OutputFormat::T42 => write!(f, "t42"),
            OutputFormat::Pes => write!(f, "pes"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "t42" => Ok(OutputFormat::T42),
            "pes" => Ok(OutputFormat::Pes),
            _ => Err(PacketError::UnknownOutputFormat(s.to_string())),
        }
    }
}

/// The T42 form of a packet, optionally with every byte bit-reversed.
pub fn t42(packet: &[u8; PACKET_SIZE], reverse: bool) -> [u8; T42_SIZE] {
    let mut out = [0u8; T42_SIZE];
    out.copy_from_slice(&packet[3..]);
    if reverse {
        for b in out.iter_mut() {
            *b = b.reverse_bits();
        }
    }
    out
}

/// Encode a 33-bit PTS into the five marker-bit form with prefix `0010`.
pub fn encode_pts(pts: u64) -> [u8; 5] {
    let pts = pts & PTS_MASK;
    [
        0x21 | ((pts >> 29) & 0x0E) as u8,
        (pts >> 22) as u8,
        ((pts >> 14) & 0xFE) as u8 | 0x01,
        (pts >> 7) as u8,
        ((pts << 1) & 0xFE) as u8 | 0x01,
    ]
}

/// Collects the lines of one field and emits them as a PES packet.
#[derive(Debug, Default)]
pub struct PesFramer {
    units: BytesMut,
    lines: usize,
}

impl PesFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines added since the last [`PesFramer::finish`].
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Add one finished packet as a data unit.
    ///
    /// `first_field` selects the field parity bit; lines are numbered from 7
    /// and anything past line 22 is sent with line offset 0.
    pub fn push(&mut self, packet: &[u8; PACKET_SIZE], subtitle: bool, first_field: bool) {
        let line = 7 + self.lines;
        let line_offset = if line <= 22 { line as u8 } else { 0 };
        let parity = if first_field { 0x20 } else { 0 };

        self.units.put_u8(if subtitle { data_unit::SUBTITLE } else { data_unit::TELETEXT });
        self.units.put_u8((PES_UNIT_SIZE - 2) as u8);
        self.units.put_u8(0xC0 | parity | line_offset);
        for b in &packet[2..] {
            self.units.put_u8(b.reverse_bits());
        }
        self.lines += 1;
    }

    /// Build the PES packet for the lines pushed so far and reset.
    pub fn finish(&mut self, pts: u64) -> Bytes {
        let mut body_size = 1 + self.units.len();
        while (PES_HEADER_SIZE + body_size) % PES_ALIGNMENT != 0 {
            body_size += PES_UNIT_SIZE;
        }
        let total = PES_HEADER_SIZE + body_size;

        let mut out = BytesMut::with_capacity(total);
        out.put_slice(&[0x00, 0x00, 0x01, 0xBD]);
        out.put_u16((total - 6) as u16);
        out.put_u8(0x84);
        out.put_u8(0x80);
        out.put_u8((PES_HEADER_SIZE - 9) as u8);
        out.put_slice(&encode_pts(pts));
        out.put_bytes(0xFF, PES_HEADER_SIZE - out.len());

        out.put_u8(DATA_IDENTIFIER);
        out.put_slice(&self.units);
        while out.len() < total {
            out.put_u8(data_unit::STUFFING);
            out.put_u8((PES_UNIT_SIZE - 2) as u8);
            out.put_bytes(0xFF, PES_UNIT_SIZE - 2);
        }

        self.units.clear();
        self.lines = 0;
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("raw".parse::<OutputFormat>().unwrap(), OutputFormat::Raw);
        assert_eq!("T42".parse::<OutputFormat>().unwrap(), OutputFormat::T42);
        assert_eq!("pes".parse::<OutputFormat>().unwrap(), OutputFormat::Pes);
        assert!("ts".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_t42() {
        let packet = *Packet::new().bytes();
        let line = t42(&packet, false);
        assert_eq!(line.len(), T42_SIZE);
        assert_eq!(&line[..], &packet[3..]);
        let reversed = t42(&packet, true);
        assert_eq!(reversed[2], 0x20u8.reverse_bits());
    }

    #[test]
    fn test_pts_zero() {
        assert_eq!(encode_pts(0), [0x21, 0x00, 0x01, 0x00, 0x01]);
        assert_eq!(encode_pts(1800), [0x21, 0x00, 0x01, 0x0E, 0x11]);
    }

    #[test]
    fn test_pes_empty_field() {
        let mut framer = PesFramer::new();
        let pes = framer.finish(0);
        assert_eq!(pes.len(), PES_ALIGNMENT);
        assert_eq!(&pes[..4], &[0x00, 0x00, 0x01, 0xBD]);
        assert_eq!(u16::from_be_bytes([pes[4], pes[5]]) as usize, PES_ALIGNMENT - 6);
        assert_eq!(pes[8], 0x24);
        assert_eq!(pes[45], DATA_IDENTIFIER);
        assert_eq!(pes[46], data_unit::STUFFING);
    }

    #[test]
    fn test_pes_units() {
        let packet = *Packet::new().bytes();
        let mut framer = PesFramer::new();
        for i in 0..17 {
            framer.push(&packet, i == 1, true);
        }
        assert_eq!(framer.lines(), 17);
        let pes = framer.finish(1800);
        assert_eq!(pes.len() % PES_ALIGNMENT, 0);
        assert_eq!(pes.len(), 46 * 20);

        let first = &pes[46..92];
        assert_eq!(first[0], data_unit::TELETEXT);
        assert_eq!(first[1], 0x2C);
        assert_eq!(first[2], 0xC0 | 0x20 | 7);
        assert_eq!(first[3], 0xE4);
        assert_eq!(pes[92], data_unit::SUBTITLE);
        assert_eq!(pes[46 + 46 * 15 + 2], 0xE0 | 22);
        // Line 23 has no line number.
        assert_eq!(pes[46 + 46 * 16 + 2], 0xE0);
        assert_eq!(framer.lines(), 0);
    }
}
