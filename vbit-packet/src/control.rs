//! Broadcast service data packets 8/30 (ETS 300 706 §9.8).
//!
//! Format 1 carries the initial page, network identification and time.
//! Format 2 carries a programme delivery control (PDC) label.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::hamming::{apply_parity, encode_8_4};
use crate::packet::{encode_link, Packet};
use crate::types::{Coding, PageNumber};

/// Bytes in the status display field.
pub const STATUS_SIZE: usize = 20;

const CONTROL_ROW: u8 = 30;
const STATUS_START: usize = 25;

/// 8/30 format 1 content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format1 {
    /// Service is multiplexed with other data.
    pub multiplexed: bool,
    pub initial_page: PageNumber,
    pub initial_subcode: u16,
    pub network_id: u16,
    /// Current UTC time.
    pub utc: NaiveDateTime,
    /// Local offset from UTC in half hours.
    pub offset_half_hours: i8,
    pub reserved: [u8; 4],
    pub status: [u8; STATUS_SIZE],
}

/// A PDC label sent in 8/30 format 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdcLabel {
    /// Label channel identifier, 0..=3.
    pub lci: u8,
    /// Label update flag.
    pub luf: bool,
    /// Prepare to record flag.
    pub prf: bool,
    /// Programme control status, 2 bits.
    pub pcs: u8,
    /// Mode identifier.
    pub mi: bool,
    /// Country and network identifier.
    pub cni: u16,
    /// Programme identification label, 20 bits.
    pub pil: u32,
    /// Programme type.
    pub pty: u8,
}

/// Modified Julian Day of `date`.
pub fn modified_julian_day(date: NaiveDate) -> u32 {
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days().max(0) as u32
}

/// Two decimal digits, each plus one, packed high digit first.
fn digits_plus_one(value: u32) -> u8 {
    let value = value % 100;
    ((value / 10 + 1) << 4 | (value % 10 + 1)) as u8
}

impl Packet {
    /// Build an 8/30 format 1 packet.
    pub fn control_830_format1(&mut self, content: &Format1) {
        self.begin_830(if content.multiplexed { 1 } else { 0 }, content.initial_page, content.initial_subcode);
        let b = &mut self.bytes;

        b[12] = (content.network_id >> 8) as u8;
        b[13] = content.network_id as u8;

        let negative = content.offset_half_hours < 0;
        let half_hours = content.offset_half_hours.unsigned_abs() & 0x1F;
        b[14] = 0x81 | half_hours << 1 | if negative { 0x40 } else { 0 };

        let mjd = modified_julian_day(content.utc.date()) % 100_000;
        b[15] = (mjd / 10_000 + 1) as u8;
        b[16] = digits_plus_one(mjd / 100);
        b[17] = digits_plus_one(mjd);

        b[18] = digits_plus_one(content.utc.hour());
        b[19] = digits_plus_one(content.utc.minute());
        b[20] = digits_plus_one(content.utc.second());

        b[21..25].copy_from_slice(&content.reserved);
        self.set_status(&content.status);
    }

    /// Build an 8/30 format 2 (PDC) packet.
    pub fn control_830_format2(
        &mut self,
        multiplexed: bool,
        initial_page: PageNumber,
        initial_subcode: u16,
        label: &PdcLabel,
        status: &[u8; STATUS_SIZE],
    ) {
        self.begin_830(if multiplexed { 3 } else { 2 }, initial_page, initial_subcode);

        let cni = label.cni as u32;
        let mut w = NibbleWriter::default();
        w.push(label.lci as u32, 2);
        w.push(label.luf as u32, 1);
        w.push(label.prf as u32, 1);
        w.push(label.pcs as u32, 2);
        w.push(label.mi as u32, 1);
        w.push(0, 1);
        w.push(cni >> 12, 4);
        w.push(cni >> 6, 2);
        w.push(label.pil, 20);
        w.push(cni >> 10, 2);
        w.push(cni >> 8, 2);
        w.push(cni >> 4, 2);
        w.push(cni, 4);
        w.push(label.pty as u32, 8);

        for (i, nibble) in w.nibbles.iter().enumerate() {
            self.bytes[12 + i] = encode_8_4(*nibble);
        }
        self.set_status(status);
    }

    fn begin_830(&mut self, designation: u8, initial_page: PageNumber, initial_subcode: u16) {
        self.reset(0, CONTROL_ROW, Coding::Raw8);
        self.bytes[5] = encode_8_4(designation);
        encode_link(&mut self.bytes[6..12], initial_page, initial_subcode, 0);
    }

    fn set_status(&mut self, status: &[u8; STATUS_SIZE]) {
        self.bytes[STATUS_START..].copy_from_slice(status);
        apply_parity(&mut self.bytes[STATUS_START..]);
    }
}

/// Packs fields most significant bit first into nibbles filled from bit 0.
#[derive(Default)]
struct NibbleWriter {
    nibbles: [u8; 13],
    position: usize,
}

impl NibbleWriter {
    fn push(&mut self, value: u32, bits: usize) {
        for i in (0..bits).rev() {
            if self.position >= self.nibbles.len() * 4 {
                return;
            }
            if value & (1 << i) != 0 {
                self.nibbles[self.position / 4] |= 1 << (self.position % 4);
            }
            self.position += 1;
        }
    }
}
