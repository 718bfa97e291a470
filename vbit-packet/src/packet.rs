//! The 45-byte teletext packet and its row encoders.
//!
//! Packet layout:
//! ```text
//! +--------+--------+------+--------+---------------------------+
//! | CRI    | CRI    | FC   | MRAG   |          Payload          |
//! | 0x55   | 0x55   | 0x27 | 2 x H84|    40 bytes, by coding    |
//! +--------+--------+------+--------+---------------------------+
//! ```
//!
//! One `Packet` is reused for every line: each builder overwrites the address
//! and payload, and [`Packet::tx`] finalises the bytes (template substitution
//! and parity) just before they are written out.

use crate::hamming::{apply_parity, encode_24_18, encode_8_4, odd_parity};
use crate::template::TemplateContext;
use crate::types::{clamp_subcode, status, Coding, PageFunction, PageNumber, MAX_SUBCODE};

/// Bytes in a packet including clock run-in and framing code.
pub const PACKET_SIZE: usize = 45;
/// Bytes after the address.
pub const PAYLOAD_SIZE: usize = 40;
/// Caption bytes in a header packet.
pub const CAPTION_SIZE: usize = 32;
/// Triplets in an enhancement packet.
pub const TRIPLETS: usize = 13;

const CLOCK_RUN_IN: u8 = 0x55;
const FRAMING_CODE: u8 = 0x27;
const PAYLOAD_START: usize = 5;
const CAPTION_START: usize = 13;

/// Default level 2.5 colour tables CLUT 2 and CLUT 3, 12-bit RGB.
const DEFAULT_CLUT_2_3: [u16; 16] = [
    0xF05, 0xF70, 0x0F7, 0xFFB, 0x0CA, 0x500, 0x652, 0xC77,
    0x333, 0xF77, 0x7F7, 0xFF7, 0x77F, 0xF7F, 0x7FF, 0xDDD,
];

/// One teletext packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub(crate) bytes: [u8; PACKET_SIZE],
    pub(crate) magazine: u8,
    pub(crate) row: u8,
    pub(crate) coding: Coding,
    /// Page shown by `%%#`; set only for header packets.
    pub(crate) header_page: Option<PageNumber>,
    /// Substitution and parity still to be applied by [`Packet::tx`].
    pub(crate) pending_text: bool,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    /// A filler packet.
    pub fn new() -> Self {
        let mut packet = Packet {
            bytes: [b' '; PACKET_SIZE],
            magazine: 0,
            row: 0,
            coding: Coding::Parity7,
            header_page: None,
            pending_text: false,
        };
        packet.bytes[0] = CLOCK_RUN_IN;
        packet.bytes[1] = CLOCK_RUN_IN;
        packet.bytes[2] = FRAMING_CODE;
        packet.filler();
        packet
    }

    /// Raw bytes. Call [`Packet::tx`] first for packets built from text.
    pub fn bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.bytes
    }

    pub fn magazine(&self) -> u8 {
        self.magazine
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn coding(&self) -> Coding {
        self.coding
    }

    pub fn is_header(&self) -> bool {
        self.header_page.is_some()
    }

    /// Set the magazine and row address bytes.
    pub fn set_mrag(&mut self, magazine: u8, row: u8) {
        let magazine = magazine & 0x07;
        let row = row & 0x1F;
        self.bytes[3] = encode_8_4(magazine | (row & 0x01) << 3);
        self.bytes[4] = encode_8_4(row >> 1);
        self.magazine = magazine;
        self.row = row;
    }

    pub(crate) fn reset(&mut self, magazine: u8, row: u8, coding: Coding) {
        self.set_mrag(magazine, row);
        self.coding = coding;
        self.header_page = None;
        self.pending_text = false;
    }

    /// Build a page header (row 0).
    ///
    /// `control` is a page status word (see [`status`]); only the C4..C14
    /// bits are used. `caption` fills the 32 caption columns and may contain
    /// template tokens.
    pub fn header(&mut self, magazine: u8, page: u8, subcode: u16, control: u16, caption: &[u8]) {
        self.reset(magazine, 0, Coding::Parity7);
        let subcode = clamp_subcode(subcode);
        let b = &mut self.bytes;

        b[5] = encode_8_4(page & 0x0F);
        b[6] = encode_8_4(page >> 4);
        b[7] = encode_8_4(subcode as u8 & 0x0F);

        let c4 = if control & status::ERASE != 0 { 0x08 } else { 0 };
        b[8] = encode_8_4((subcode >> 4) as u8 & 0x07 | c4);
        b[9] = encode_8_4((subcode >> 8) as u8 & 0x0F);

        let mut c5_c6 = 0;
        if control & status::NEWSFLASH != 0 {
            c5_c6 |= 0x04;
        }
        if control & status::SUBTITLE != 0 {
            c5_c6 |= 0x08;
        }
        b[10] = encode_8_4((subcode >> 12) as u8 & 0x03 | c5_c6);

        let mut c7_c10 = 0;
        if control & status::SUPPRESS_HEADER != 0 {
            c7_c10 |= 0x01;
        }
        if control & status::UPDATE != 0 {
            c7_c10 |= 0x02;
        }
        if control & status::INTERRUPTED != 0 {
            c7_c10 |= 0x04;
        }
        if control & status::INHIBIT_DISPLAY != 0 {
            c7_c10 |= 0x08;
        }
        b[11] = encode_8_4(c7_c10);
        b[12] = encode_8_4(((control & (status::MAGAZINE_SERIAL | status::LANGUAGE)) >> 6) as u8);

        copy_text(&mut b[CAPTION_START..], caption);

        self.header_page = Some(PageNumber::new(magazine, page));
        self.pending_text = true;
    }

    /// Build a filler header for page mFF that carries no page.
    pub fn filler_header(&mut self, magazine: u8, caption: &[u8]) {
        self.header(magazine, 0xFF, MAX_SUBCODE, 0, caption);
    }

    /// Build a body row with the given coding.
    ///
    /// `text` is padded with spaces or cut to 40 bytes. For
    /// [`Coding::Triplets`] the row holds the TTI six-bits-per-character form:
    /// one designation character followed by three characters per triplet.
    pub fn set_row(&mut self, magazine: u8, row: u8, text: &[u8], coding: Coding) {
        self.reset(magazine, row, coding);
        let mut src = [b' '; PAYLOAD_SIZE];
        let n = text.len().min(PAYLOAD_SIZE);
        src[..n].copy_from_slice(&text[..n]);

        let out = &mut self.bytes[PAYLOAD_START..];
        match coding {
            Coding::Parity7 => {
                for (o, s) in out.iter_mut().zip(src.iter()) {
                    *o = s & 0x7F;
                }
                self.pending_text = true;
            }
            Coding::Raw8 => out.copy_from_slice(&src),
            Coding::Triplets => {
                out[0] = encode_8_4(src[0]);
                for t in 0..TRIPLETS {
                    let c = &src[1 + t * 3..4 + t * 3];
                    let value = (c[0] & 0x3F) as u32 | ((c[1] & 0x3F) as u32) << 6 | ((c[2] & 0x3F) as u32) << 12;
                    out[1 + t * 3..4 + t * 3].copy_from_slice(&encode_24_18(value));
                }
            }
            Coding::Hamming84 => {
                for (o, s) in out.iter_mut().zip(src.iter()) {
                    *o = encode_8_4(*s);
                }
            }
            Coding::AitMixed => {
                for group in 0..2 {
                    let base = group * 20;
                    for i in base..base + 8 {
                        out[i] = encode_8_4(src[i]);
                    }
                    for i in base + 8..base + 20 {
                        out[i] = odd_parity(src[i]);
                    }
                }
            }
            Coding::PerPacket => {
                out[0] = encode_8_4(src[0]);
                match src[0] & 0x0F {
                    0 => {
                        for (o, s) in out[1..].iter_mut().zip(src[1..].iter()) {
                            *o = odd_parity(*s);
                        }
                    }
                    3 => {
                        for (o, s) in out[1..].iter_mut().zip(src[1..].iter()) {
                            *o = encode_8_4(*s);
                        }
                    }
                    _ => out[1..].copy_from_slice(&src[1..]),
                }
            }
        }
    }

    /// Copy up to 40 bytes of 8-bit data into the payload; the rest is zero.
    ///
    /// Returns the number of bytes taken from `data`.
    pub fn set_raw(&mut self, magazine: u8, row: u8, data: &[u8]) -> usize {
        self.reset(magazine, row, Coding::Raw8);
        let n = data.len().min(PAYLOAD_SIZE);
        let out = &mut self.bytes[PAYLOAD_START..];
        out.fill(0);
        out[..n].copy_from_slice(&data[..n]);
        n
    }

    /// Build an enhancement packet (X/26, X/27/4+, X/28, M/29).
    pub fn set_triplets(&mut self, magazine: u8, row: u8, designation: u8, triplets: &[u32; TRIPLETS]) {
        self.reset(magazine, row, Coding::Triplets);
        self.bytes[PAYLOAD_START] = encode_8_4(designation);
        for (i, triplet) in triplets.iter().enumerate() {
            let at = PAYLOAD_START + 1 + i * 3;
            self.bytes[at..at + 3].copy_from_slice(&encode_24_18(*triplet));
        }
    }

    /// Build an X/27/0 editorial link packet for six link targets.
    ///
    /// The page check word is left at zero; patch it with
    /// [`Packet::set_x27_crc`] once the page CRC is known.
    pub fn fastext(&mut self, magazine: u8, links: &[PageNumber; 6]) {
        self.reset(magazine, 27, Coding::Hamming84);
        self.bytes[PAYLOAD_START] = encode_8_4(0);
        for (i, link) in links.iter().enumerate() {
            let at = PAYLOAD_START + 1 + i * 6;
            encode_link(&mut self.bytes[at..at + 6], *link, MAX_SUBCODE, magazine);
        }
        // Link control: show row 24.
        self.bytes[42] = encode_8_4(0x0F);
        self.bytes[43] = 0;
        self.bytes[44] = 0;
    }

    /// Write the page check word into an X/27/0 packet.
    pub fn set_x27_crc(&mut self, crc: u16) {
        if self.row == 27 && !self.pending_text {
            self.bytes[43] = (crc >> 8) as u8;
            self.bytes[44] = crc as u8;
        }
    }

    /// Build an X/28/0 format 1 packet declaring the page's character set.
    ///
    /// Both the default and the second G0 set are `(region << 3) | language`.
    /// The colour map carries the default CLUT 2 and 3 values.
    pub fn x28_region(&mut self, magazine: u8, function: PageFunction, coding: Coding, region: u8, language: u8) {
        let charset = ((region & 0x0F) << 3 | (language & 0x07)) as u32;
        let mut w = TripletWriter::default();
        w.push(function.nibble() as u32, 4);
        w.push(coding.nibble() as u32, 3);
        w.push(charset, 7);
        w.push(charset, 7);
        // Side panels off.
        w.push(0, 3);
        w.push(0, 4);
        for colour in DEFAULT_CLUT_2_3 {
            w.push((colour >> 8) as u32 & 0x0F, 4);
            w.push((colour >> 4) as u32 & 0x0F, 4);
            w.push(colour as u32 & 0x0F, 4);
        }
        // Default screen and row colour black, no substitution, no remapping.
        w.push(0, 5);
        w.push(0, 5);
        w.push(0, 1);
        w.push(0, 3);
        self.set_triplets(magazine, 28, 0, &w.triplets);
    }

    /// Turn the packet into a filler line (8/25 of spaces).
    pub fn filler(&mut self) {
        self.reset(0, 25, Coding::Parity7);
        self.bytes[PAYLOAD_START..].fill(odd_parity(b' '));
    }

    /// Finalise the packet for transmission and return its bytes.
    ///
    /// Header captions and 7-bit text rows get template substitution and then
    /// odd parity. Rows of other codings are already final; in particular a
    /// row carrying a CRC is never rewritten here.
    pub fn tx(&mut self, context: &TemplateContext) -> &[u8; PACKET_SIZE] {
        if self.pending_text {
            let start = if self.header_page.is_some() { CAPTION_START } else { PAYLOAD_START };
            context.substitute(&mut self.bytes[start..], self.header_page);
            apply_parity(&mut self.bytes[start..]);
            self.pending_text = false;
        }
        &self.bytes
    }
}

/// Encode a page link as six Hamming 8/4 bytes: page units, page tens, then
/// the subcode nibbles with the magazine bits relative to `magazine`.
pub(crate) fn encode_link(out: &mut [u8], link: PageNumber, subcode: u16, magazine: u8) {
    let relative = link.magazine() ^ (magazine & 0x07);
    let subcode = clamp_subcode(subcode);
    out[0] = encode_8_4(link.page() & 0x0F);
    out[1] = encode_8_4(link.page() >> 4);
    out[2] = encode_8_4(subcode as u8 & 0x0F);
    out[3] = encode_8_4((subcode >> 4) as u8 & 0x07 | (relative & 0x01) << 3);
    out[4] = encode_8_4((subcode >> 8) as u8 & 0x0F);
    out[5] = encode_8_4((subcode >> 12) as u8 & 0x03 | (relative & 0x06) << 1);
}

/// Copy text into a field, masking to 7 bits and padding with spaces.
fn copy_text(out: &mut [u8], text: &[u8]) {
    for (i, o) in out.iter_mut().enumerate() {
        *o = text.get(i).map_or(b' ', |b| b & 0x7F);
    }
}

/// Packs a bit stream into 18-bit triplets, least significant bit first.
#[derive(Default)]
struct TripletWriter {
    triplets: [u32; TRIPLETS],
    position: usize,
}

impl TripletWriter {
    fn push(&mut self, value: u32, bits: usize) {
        for i in 0..bits {
            if self.position >= TRIPLETS * 18 {
                return;
            }
            if value & (1 << i) != 0 {
                self.triplets[self.position / 18] |= 1 << (self.position % 18);
            }
            self.position += 1;
        }
    }
}
