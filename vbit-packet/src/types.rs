//! Page addressing and page attribute types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PacketError;

/// Largest subcode that fits the header's subcode nibbles (S4 has two bits,
/// S2 has three).
pub const MAX_SUBCODE: u16 = 0x3F7F;

/// Mask a subcode to the bits the header can carry.
pub fn clamp_subcode(subcode: u16) -> u16 {
    subcode & MAX_SUBCODE
}

/// Teletext page number `mpp`.
///
/// The magazine digit is 1..=8 in bits 8..11, with 8 standing for the
/// internal magazine 0. The page byte is 0x00..=0xFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageNumber(u16);

impl PageNumber {
    /// Link target meaning "no page", used for unset fastext links.
    pub const UNSET: PageNumber = PageNumber(0x8FF);

    /// Build a page number from a magazine digit (1..=8, 0 is read as 8) and
    /// a page byte.
    pub fn new(magazine: u8, page: u8) -> Self {
        let digit = match magazine & 0x07 {
            0 => 8,
            m => m,
        };
        PageNumber((digit as u16) << 8 | page as u16)
    }

    /// Build from the `0xmpp` form, normalising the magazine digit.
    pub fn from_raw(raw: u16) -> Self {
        Self::new((raw >> 8) as u8, raw as u8)
    }

    /// Build from the 20-bit TTI `0xmppss` form; the subpage byte is dropped.
    pub fn from_mppss(value: u32) -> Self {
        Self::from_raw((value >> 8) as u16)
    }

    /// The `0xmpp` value.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Magazine digit 1..=8.
    pub fn magazine_digit(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Internal magazine 0..=7.
    pub fn magazine(self) -> u8 {
        self.magazine_digit() & 0x07
    }

    /// Page byte.
    pub fn page(self) -> u8 {
        self.0 as u8
    }

    pub fn is_unset(self) -> bool {
        self == Self::UNSET
    }

    /// Page mFF carries magazine-level data and is never in the rotation.
    pub fn is_magazine_page(self) -> bool {
        self.page() == 0xFF
    }

    /// True when either page digit is A..F.
    pub fn has_hex_digit(self) -> bool {
        self.page() & 0x0F > 9 || self.page() >> 4 > 9
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X}", self.0)
    }
}

impl FromStr for PageNumber {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 3 {
            return Err(PacketError::InvalidPageNumber(s.to_string()));
        }
        let raw = u16::from_str_radix(trimmed, 16)
            .map_err(|_| PacketError::InvalidPageNumber(s.to_string()))?;
        let digit = raw >> 8;
        if !(1..=8).contains(&digit) {
            return Err(PacketError::InvalidPageNumber(s.to_string()));
        }
        Ok(PageNumber(raw))
    }
}

impl TryFrom<String> for PageNumber {
    type Error = PacketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PageNumber> for String {
    fn from(value: PageNumber) -> Self {
        value.to_string()
    }
}

/// Payload coding of a packet (ETS 300 706 Table 3 page coding values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coding {
    /// 7-bit text with odd parity.
    #[default]
    Parity7,
    /// 8-bit bytes sent as they are.
    Raw8,
    /// Designation code and 13 Hamming 24/18 triplets.
    Triplets,
    /// Every byte Hamming 8/4.
    Hamming84,
    /// Two groups of 8 Hamming 8/4 bytes followed by 12 parity bytes.
    AitMixed,
    /// The first byte is Hamming 8/4 and selects the coding of the rest.
    PerPacket,
}

impl Coding {
    /// Decode a page coding nibble. Unknown values fall back to text.
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            1 => Coding::Raw8,
            2 => Coding::Triplets,
            3 => Coding::Hamming84,
            4 => Coding::AitMixed,
            5 => Coding::PerPacket,
            _ => Coding::Parity7,
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Coding::Parity7 => 0,
            Coding::Raw8 => 1,
            Coding::Triplets => 2,
            Coding::Hamming84 => 3,
            Coding::AitMixed => 4,
            Coding::PerPacket => 5,
        }
    }
}

/// Page function (ETS 300 706 Table 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFunction {
    /// Basic level one page.
    #[default]
    Lop,
    DataBroadcast,
    GlobalObjects,
    NormalObjects,
    GlobalDrcs,
    NormalDrcs,
    MagazineOrganisation,
    MagazineInventory,
    BasicTopTable,
    AdditionalInformation,
    MultiPageTable,
    MultiPageExtension,
}

impl PageFunction {
    /// Decode a page function nibble. Reserved values read as a LOP.
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            1 => PageFunction::DataBroadcast,
            2 => PageFunction::GlobalObjects,
            3 => PageFunction::NormalObjects,
            4 => PageFunction::GlobalDrcs,
            5 => PageFunction::NormalDrcs,
            6 => PageFunction::MagazineOrganisation,
            7 => PageFunction::MagazineInventory,
            8 => PageFunction::BasicTopTable,
            9 => PageFunction::AdditionalInformation,
            10 => PageFunction::MultiPageTable,
            11 => PageFunction::MultiPageExtension,
            _ => PageFunction::Lop,
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            PageFunction::Lop => 0,
            PageFunction::DataBroadcast => 1,
            PageFunction::GlobalObjects => 2,
            PageFunction::NormalObjects => 3,
            PageFunction::GlobalDrcs => 4,
            PageFunction::NormalDrcs => 5,
            PageFunction::MagazineOrganisation => 6,
            PageFunction::MagazineInventory => 7,
            PageFunction::BasicTopTable => 8,
            PageFunction::AdditionalInformation => 9,
            PageFunction::MultiPageTable => 10,
            PageFunction::MultiPageExtension => 11,
        }
    }
}

/// Page status word bits, as found in the TTI `PS` field.
pub mod status {
    /// C5 newsflash.
    pub const NEWSFLASH: u16 = 0x0001;
    /// C6 subtitle.
    pub const SUBTITLE: u16 = 0x0002;
    /// C7 suppress header.
    pub const SUPPRESS_HEADER: u16 = 0x0004;
    /// C8 update indicator.
    pub const UPDATE: u16 = 0x0008;
    /// C9 interrupted sequence.
    pub const INTERRUPTED: u16 = 0x0010;
    /// C10 inhibit display.
    pub const INHIBIT_DISPLAY: u16 = 0x0020;
    /// C11 magazine serial.
    pub const MAGAZINE_SERIAL: u16 = 0x0040;
    /// C12..C14 national option character subset.
    pub const LANGUAGE: u16 = 0x0380;
    /// C4 erase page.
    pub const ERASE: u16 = 0x4000;
    /// Page is on air.
    pub const TRANSMIT: u16 = 0x8000;

    /// Bits that end up in the header control nibbles.
    pub const HEADER_BITS: u16 = ERASE | 0x03FF;

    /// National option (C12..C14) as a 3-bit value.
    pub fn language(status: u16) -> u8 {
        ((status & LANGUAGE) >> 7) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number_magazine_normalisation() {
        assert_eq!(PageNumber::new(0, 0x00).raw(), 0x800);
        assert_eq!(PageNumber::new(8, 0x88).magazine(), 0);
        assert_eq!(PageNumber::new(1, 0x00).magazine(), 1);
        assert_eq!(PageNumber::from_raw(0x0FF), PageNumber::UNSET);
        assert_eq!(PageNumber::from_mppss(0x10001), PageNumber::new(1, 0x00));
    }

    #[test]
    fn test_page_number_parse() {
        assert_eq!("100".parse::<PageNumber>().unwrap(), PageNumber::new(1, 0x00));
        assert_eq!("8FF".parse::<PageNumber>().unwrap(), PageNumber::UNSET);
        assert!("900".parse::<PageNumber>().is_err());
        assert!("1000".parse::<PageNumber>().is_err());
        assert!("1G0".parse::<PageNumber>().is_err());
        assert_eq!(PageNumber::new(3, 0x1A).to_string(), "31A");
    }

    #[test]
    fn test_page_number_flags() {
        assert!(PageNumber::new(1, 0xFF).is_magazine_page());
        assert!(PageNumber::new(1, 0x1A).has_hex_digit());
        assert!(PageNumber::new(1, 0xA1).has_hex_digit());
        assert!(!PageNumber::new(1, 0x99).has_hex_digit());
    }

    #[test]
    fn test_coding_nibbles() {
        for n in 0..6 {
            assert_eq!(Coding::from_nibble(n).nibble(), n);
        }
        assert_eq!(Coding::from_nibble(0xE), Coding::Parity7);
        assert_eq!(PageFunction::from_nibble(6), PageFunction::MagazineOrganisation);
        assert_eq!(PageFunction::from_nibble(0xF), PageFunction::Lop);
    }

    #[test]
    fn test_subcode_clamp() {
        assert_eq!(clamp_subcode(0xFFFF), 0x3F7F);
        assert_eq!(clamp_subcode(0x0001), 0x0001);
    }

    #[test]
    fn test_language_bits() {
        assert_eq!(status::language(0x0380), 7);
        assert_eq!(status::language(0x0080), 1);
    }
}
