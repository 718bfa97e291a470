//! Per-magazine page sequencer.
//!
//! Each magazine sends one page at a time, one packet per call:
//!
//! ```text
//! Header ──> Fastext ──┐
//!    │                 ├──> Packet27 ──> Packet28 ──> Packet26 ──> TextRow ──> Header
//!    └─────────────────┘
//! ```
//!
//! Fastext is skipped when the page has no links. Within one call the
//! enhancement states fall through to the first one that has something to
//! send; a call never runs past the end of the page into the next header.

use std::collections::VecDeque;
use std::sync::Arc;

use log::trace;
use vbit_packet::packet::CAPTION_SIZE;
use vbit_packet::{status, Coding, Packet, PageNumber, TemplateContext};

use super::events::{Event, EventFlags};
use super::stats::CycleStats;
use super::PacketSource;
use crate::clock::MasterClock;
use crate::config::SharedConfig;
use crate::page::handle::LockAttempt;
use crate::page::model::{EnhancementLine, LAST_TEXT_ROW};
use crate::page::{PageList, Selection};

/// Fields to wait after a header before the next one.
const HEADER_GAP_FIELDS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MagazineState {
    Header,
    Fastext,
    Packet27,
    Packet28,
    Packet26,
    TextRow,
}

#[derive(Debug)]
pub struct MagazineSequencer {
    magazine: u8,
    name: String,
    pages: Arc<PageList>,
    clock: Arc<MasterClock>,
    config: SharedConfig,
    stats: Arc<CycleStats>,
    events: EventFlags,

    state: MagazineState,
    current: Option<Selection>,
    /// Caption the current page's header went out with, tokens replaced.
    header_caption: [u8; CAPTION_SIZE],
    /// Template values of the current field.
    context: TemplateContext,
    row: u8,
    enhancement: usize,
    x28_checked: bool,

    priority: u8,
    countdown: u8,
    fields_until_header: u8,
    special_pass: bool,
    packet29: VecDeque<EnhancementLine>,

    row_adaptive: bool,
    caption: [u8; CAPTION_SIZE],
    /// Caption from row 0 of page mFF, used instead of the configured one.
    custom_caption: Option<[u8; CAPTION_SIZE]>,
}

impl MagazineSequencer {
    /// Sequencer for internal magazine 0..=7.
    pub fn new(
        magazine: u8,
        pages: Arc<PageList>,
        clock: Arc<MasterClock>,
        config: SharedConfig,
        stats: Arc<CycleStats>,
    ) -> Self {
        let magazine = magazine & 0x07;
        let mut sequencer = Self {
            magazine,
            name: format!("magazine {}", PageNumber::new(magazine, 0).magazine_digit()),
            pages,
            clock,
            config,
            stats,
            events: EventFlags::new(),
            state: MagazineState::Header,
            current: None,
            header_caption: [b' '; CAPTION_SIZE],
            context: TemplateContext::now(env!("CARGO_PKG_VERSION"), ""),
            row: 1,
            enhancement: 0,
            x28_checked: false,
            priority: 1,
            countdown: 0,
            fields_until_header: 0,
            special_pass: false,
            packet29: VecDeque::new(),
            row_adaptive: false,
            caption: [b' '; CAPTION_SIZE],
            custom_caption: None,
        };
        sequencer.refresh_settings();
        sequencer
    }

    pub fn magazine(&self) -> u8 {
        self.magazine
    }

    /// Pick up config changes and the mFF caption. Skipped while the config
    /// is being written.
    fn refresh_settings(&mut self) {
        if let Some(config) = self.config.try_read() {
            self.priority = config.service.priority_of(self.magazine).max(1);
            self.row_adaptive = config.service.row_adaptive;
            self.caption = config.header.caption_bytes();
        }

        self.custom_caption = match self.pages.magazine_page(self.magazine) {
            None => None,
            Some(handle) => match handle.try_content() {
                LockAttempt::Locked(page) => page.current().row(0).map(|row| {
                    let mut caption = [b' '; CAPTION_SIZE];
                    caption.copy_from_slice(&row[8..8 + CAPTION_SIZE]);
                    caption
                }),
                LockAttempt::Busy => self.custom_caption,
            },
        };
    }

    /// Queue the M/29 lines of page mFF.
    fn load_packet29(&mut self) {
        self.packet29.clear();
        let Some(handle) = self.pages.magazine_page(self.magazine) else {
            return;
        };
        match handle.try_content() {
            LockAttempt::Locked(page) => self.packet29.extend(page.current().enhancements_for(29).cloned()),
            LockAttempt::Busy => trace!("{}: page {} busy, M/29 skipped", self.name, handle.number()),
        };
    }

    /// The next page to send and the status bits its header adds.
    fn select(&mut self) -> Option<(Selection, u16)> {
        let now = self.clock.fields();
        let fields_per_second = self.clock.fields_per_second();
        let Some(mut queues) = self.pages.queues(self.magazine).try_lock() else {
            trace!("{}: queues busy", self.name);
            return None;
        };

        if self.special_pass {
            if let Some(selection) = queues.special.next() {
                return Some((selection, 0));
            }
            self.special_pass = false;
        }

        if let Some(selection) = queues.updated.next() {
            return Some((selection, status::ERASE | status::UPDATE | status::INTERRUPTED));
        }

        if let Some(selection) = queues.carousel.next(now, fields_per_second) {
            let mut control = status::INTERRUPTED;
            if selection.carousel_step {
                control |= status::ERASE;
            }
            return Some((selection, control));
        }

        let selection = queues.normal.next();
        if queues.normal.take_pass_complete() {
            self.stats.cycle_complete(self.magazine, now);
        }
        selection.map(|s| (s, 0))
    }

    fn send_header(&mut self, packet: &mut Packet) -> bool {
        if let Some(line) = self.packet29.pop_front() {
            packet.set_triplets(self.magazine, 29, line.designation, &line.triplets);
            return true;
        }

        let mut caption = self.custom_caption.unwrap_or(self.caption);
        self.fields_until_header = HEADER_GAP_FIELDS;
        let Some((mut selection, control)) = self.select() else {
            packet.filler_header(self.magazine, &caption);
            return true;
        };

        // Freeze the page text now so the X/27 check word matches what goes
        // out; `tx` finds no tokens left to replace.
        self.context.substitute(&mut caption, Some(selection.number()));
        selection.subpage.substitute_rows(&self.context);

        let subpage = &selection.subpage;
        trace!("{}: page {} subcode {:04X}", self.name, selection.number(), subpage.subcode);
        packet.header(
            self.magazine,
            selection.number().page(),
            subpage.subcode,
            subpage.status | control,
            &caption,
        );

        self.header_caption = caption;
        self.row = 1;
        self.enhancement = 0;
        self.x28_checked = false;
        self.state = if subpage.links_unset() {
            MagazineState::Packet27
        } else {
            MagazineState::Fastext
        };
        self.current = Some(selection);
        true
    }

    fn send_body(&mut self, packet: &mut Packet) -> bool {
        let magazine = self.magazine;
        let emitted = 'page: {
            let Some(selection) = self.current.as_ref() else {
                break 'page false;
            };
            let subpage = &selection.subpage;
            let fastext = !subpage.links_unset();

            loop {
                match self.state {
                    MagazineState::Header => break 'page false,
                    MagazineState::Fastext => {
                        packet.fastext(magazine, &subpage.links);
                        packet.set_x27_crc(subpage.page_crc(&self.header_caption));
                        self.state = MagazineState::Packet27;
                        self.enhancement = 0;
                        break 'page true;
                    }
                    MagazineState::Packet27 => {
                        let line = subpage
                            .enhancements_for(27)
                            .filter(|l| !(fastext && l.designation == 0))
                            .nth(self.enhancement);
                        if let Some(line) = line {
                            packet.set_triplets(magazine, 27, line.designation, &line.triplets);
                            self.enhancement += 1;
                            break 'page true;
                        }
                        self.state = MagazineState::Packet28;
                        self.enhancement = 0;
                    }
                    MagazineState::Packet28 => {
                        if !self.x28_checked {
                            self.x28_checked = true;
                            let stored = subpage
                                .enhancements_for(28)
                                .any(|l| l.designation == 0 || l.designation == 4);
                            if subpage.region != 0 && !stored {
                                packet.x28_region(
                                    magazine,
                                    subpage.function,
                                    subpage.coding,
                                    subpage.region,
                                    status::language(subpage.status),
                                );
                                break 'page true;
                            }
                        }
                        if let Some(line) = subpage.enhancements_for(28).nth(self.enhancement) {
                            packet.set_triplets(magazine, 28, line.designation, &line.triplets);
                            self.enhancement += 1;
                            break 'page true;
                        }
                        self.state = MagazineState::Packet26;
                        self.enhancement = 0;
                    }
                    MagazineState::Packet26 => {
                        if let Some(line) = subpage.enhancements_for(26).nth(self.enhancement) {
                            packet.set_triplets(magazine, 26, line.designation, &line.triplets);
                            self.enhancement += 1;
                            break 'page true;
                        }
                        if subpage.coding != Coding::Parity7 && !subpage.has_text_rows() {
                            break 'page false;
                        }
                        self.state = MagazineState::TextRow;
                    }
                    MagazineState::TextRow => {
                        while self.row <= LAST_TEXT_ROW {
                            let row = self.row;
                            self.row += 1;
                            let Some(text) = subpage.row(row) else {
                                continue;
                            };
                            if self.row_adaptive && subpage.coding == Coding::Parity7 && subpage.is_blank_row(row) {
                                continue;
                            }
                            packet.set_row(magazine, row, text, subpage.coding);
                            break 'page true;
                        }
                        break 'page false;
                    }
                }
            }
        };

        if !emitted {
            self.state = MagazineState::Header;
            self.current = None;
        }
        emitted
    }
}

impl PacketSource for MagazineSequencer {
    fn name(&self) -> &str {
        &self.name
    }

    fn events(&mut self) -> &mut EventFlags {
        &mut self.events
    }

    fn is_ready(&mut self, force: bool) -> bool {
        if self.events.take(Event::Field) {
            self.fields_until_header = self.fields_until_header.saturating_sub(1);
            self.refresh_settings();
        }
        if self.events.take(Event::SpecialPages) {
            self.special_pass = true;
        }
        if self.events.take(Event::Packet29) {
            self.load_packet29();
        }

        if self.state == MagazineState::Header {
            if self.fields_until_header > 0 {
                return false;
            }
            if self.packet29.is_empty() && !self.pages.has_pages(self.magazine) {
                return false;
            }
        }

        if !force && self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        self.countdown = self.priority - 1;
        true
    }

    fn set_context(&mut self, context: &TemplateContext) {
        self.context.now = context.now;
        self.context.version.clone_from(&context.version);
        self.context.address.clone_from(&context.address);
    }

    fn get_packet(&mut self, packet: &mut Packet) -> bool {
        match self.state {
            MagazineState::Header => self.send_header(packet),
            _ => self.send_body(packet),
        }
    }
}
