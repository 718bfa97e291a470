//! Pages and subpages as loaded from page files.

use std::path::PathBuf;

use vbit_packet::packet::{CAPTION_SIZE, PAYLOAD_SIZE, TRIPLETS};
use vbit_packet::{clamp_subcode, status, Coding, PageCrc, PageFunction, PageNumber, TemplateContext};

/// Highest displayable row.
pub const LAST_TEXT_ROW: u8 = 25;

const ROW_COUNT: usize = LAST_TEXT_ROW as usize + 1;

/// How a carousel moves to its next subpage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleMode {
    /// After `cycle_time` seconds.
    #[default]
    Timed,
    /// After `cycle_time` transmissions.
    Count,
}

/// One enhancement packet (rows 26..=29) stored with a subpage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementLine {
    pub row: u8,
    pub designation: u8,
    pub triplets: [u32; TRIPLETS],
}

/// Classification that decides which queue a page joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Page mFF: magazine-level data, never in a rotation.
    Magazine,
    /// Not a basic level one page.
    Special,
    /// Several subpages on a timer.
    Carousel,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpage {
    pub subcode: u16,
    pub cycle_time: u32,
    pub cycle_mode: CycleMode,
    pub status: u16,
    /// Character set region, 0..=15.
    pub region: u8,
    pub links: [PageNumber; 6],
    pub function: PageFunction,
    pub coding: Coding,
    pub enhancements: Vec<EnhancementLine>,
    rows: [Option<[u8; PAYLOAD_SIZE]>; ROW_COUNT],
}

impl Default for Subpage {
    fn default() -> Self {
        Self {
            subcode: 0,
            cycle_time: 8,
            cycle_mode: CycleMode::Timed,
            status: status::TRANSMIT,
            region: 0,
            links: [PageNumber::UNSET; 6],
            function: PageFunction::Lop,
            coding: Coding::Parity7,
            enhancements: Vec::new(),
            rows: [None; ROW_COUNT],
        }
    }
}

impl Subpage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_subcode(&mut self, subcode: u16) {
        self.subcode = clamp_subcode(subcode);
    }

    pub fn set_region(&mut self, region: u8) {
        self.region = region & 0x0F;
    }

    /// Row `row` (0..=25), if present. Row 0 is only used by page mFF.
    pub fn row(&self, row: u8) -> Option<&[u8; PAYLOAD_SIZE]> {
        self.rows.get(row as usize).and_then(|r| r.as_ref())
    }

    /// Store row `row`, padded with spaces. Rows past 25 are ignored.
    pub fn set_row(&mut self, row: u8, text: &[u8]) {
        if let Some(slot) = self.rows.get_mut(row as usize) {
            let mut line = [b' '; PAYLOAD_SIZE];
            let n = text.len().min(PAYLOAD_SIZE);
            line[..n].copy_from_slice(&text[..n]);
            *slot = Some(line);
        }
    }

    pub fn clear_row(&mut self, row: u8) {
        if let Some(slot) = self.rows.get_mut(row as usize) {
            *slot = None;
        }
    }

    /// True when any of rows 1..=25 is present.
    pub fn has_text_rows(&self) -> bool {
        self.rows[1..].iter().any(Option::is_some)
    }

    /// True when the row is absent or only spaces.
    pub fn is_blank_row(&self, row: u8) -> bool {
        self.row(row).map_or(true, |r| r.iter().all(|&b| b & 0x7F == b' '))
    }

    pub fn links_unset(&self) -> bool {
        self.links.iter().all(|l| l.is_unset())
    }

    pub fn is_transmitted(&self) -> bool {
        self.status & status::TRANSMIT != 0
    }

    /// Stored enhancement lines for `row`, in file order.
    pub fn enhancements_for(&self, row: u8) -> impl Iterator<Item = &EnhancementLine> {
        self.enhancements.iter().filter(move |l| l.row == row)
    }

    /// Replace template tokens in the text rows with their current values.
    ///
    /// Only 7-bit text pages are touched, matching what [`Packet::tx`] does on
    /// air, so a page CRC taken afterwards covers the text as sent.
    ///
    /// [`Packet::tx`]: vbit_packet::Packet::tx
    pub fn substitute_rows(&mut self, context: &TemplateContext) {
        if self.coding != Coding::Parity7 {
            return;
        }
        for line in self.rows[1..].iter_mut().flatten() {
            context.substitute(line, None);
        }
    }

    /// Page check word for X/27/0.
    ///
    /// Covers the first 24 caption columns of the header and rows 1..=25 as
    /// 7-bit characters; absent rows count as spaces.
    pub fn page_crc(&self, caption: &[u8; CAPTION_SIZE]) -> u16 {
        let mut crc = PageCrc::new();
        for b in &caption[..24] {
            crc.update(b & 0x7F);
        }
        for row in 1..=LAST_TEXT_ROW {
            match self.row(row) {
                Some(text) => {
                    for b in text {
                        crc.update(b & 0x7F);
                    }
                }
                None => crc.update_slice(&[b' '; PAYLOAD_SIZE]),
            }
        }
        crc.value()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    number: PageNumber,
    subpages: Vec<Subpage>,
    current: usize,
    /// Transmissions of the current subpage, for count-mode carousels.
    transmissions: u32,
    pub description: String,
    pub filename: Option<PathBuf>,
}

impl Page {
    /// A page always has at least one subpage.
    pub fn new(number: PageNumber, first: Subpage) -> Self {
        Self {
            number,
            subpages: vec![first],
            current: 0,
            transmissions: 0,
            description: String::new(),
            filename: None,
        }
    }

    pub fn number(&self) -> PageNumber {
        self.number
    }

    pub fn subpages(&self) -> &[Subpage] {
        &self.subpages
    }

    pub fn subpages_mut(&mut self) -> &mut [Subpage] {
        &mut self.subpages
    }

    pub fn add_subpage(&mut self, subpage: Subpage) {
        self.subpages.push(subpage);
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Subpage {
        &self.subpages[self.current]
    }

    /// Move to the next subpage; returns true when it wrapped to the first.
    pub fn step_subpage(&mut self) -> bool {
        self.transmissions = 0;
        self.current += 1;
        if self.current >= self.subpages.len() {
            self.current = 0;
            true
        } else {
            false
        }
    }

    pub fn set_current(&mut self, index: usize) {
        if index < self.subpages.len() {
            self.current = index;
            self.transmissions = 0;
        }
    }

    /// Count one transmission of a count-mode carousel; steps the subpage
    /// once the current one has been sent `cycle_time` times.
    pub fn count_transmission(&mut self) {
        if self.subpages.len() < 2 || self.current().cycle_mode != CycleMode::Count {
            return;
        }
        self.transmissions += 1;
        if self.transmissions >= self.current().cycle_time.max(1) {
            self.step_subpage();
        }
    }

    pub fn kind(&self) -> PageKind {
        let first = &self.subpages[0];
        if self.number.is_magazine_page() {
            PageKind::Magazine
        } else if first.function != PageFunction::Lop {
            PageKind::Special
        } else if self.subpages.len() > 1 && first.cycle_mode == CycleMode::Timed {
            PageKind::Carousel
        } else {
            PageKind::Normal
        }
    }
}
