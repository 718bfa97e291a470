//! Live subtitle pages.
//!
//! A producer hands pages to a [`SubtitleChannel`]. The [`SubtitleSource`]
//! takes the newest one when it is idle and sends it ahead of every magazine,
//! as many times as configured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;
use vbit_packet::packet::CAPTION_SIZE;
use vbit_packet::{status, Coding, Packet};

use super::events::{Event, EventFlags};
use super::PacketSource;
use crate::config::SharedConfig;
use crate::output::LineKind;
use crate::page::model::{Page, LAST_TEXT_ROW};

#[derive(Debug, Default)]
struct BackBuffer {
    page: Mutex<Option<Page>>,
    ready: AtomicBool,
}

/// Handle for submitting subtitle pages from any thread.
#[derive(Debug, Clone, Default)]
pub struct SubtitleChannel {
    inner: Arc<BackBuffer>,
}

impl SubtitleChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the waiting page, if any, with `page`.
    pub fn submit(&self, page: Page) {
        *self.inner.page.lock() = Some(page);
        self.inner.ready.store(true, Ordering::Release);
    }

    pub fn has_pending(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Take the waiting page without blocking.
    fn try_take(&self) -> Option<Page> {
        if !self.has_pending() {
            return None;
        }
        let mut back = self.inner.page.try_lock()?;
        self.inner.ready.store(false, Ordering::Release);
        back.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubtitleState {
    Idle,
    Header,
    TextRow,
}

#[derive(Debug)]
pub struct SubtitleSource {
    channel: SubtitleChannel,
    config: SharedConfig,
    events: EventFlags,
    state: SubtitleState,
    front: Option<Page>,
    row: u8,
    repeats_left: u8,
    caption: [u8; CAPTION_SIZE],
}

impl SubtitleSource {
    pub fn new(channel: SubtitleChannel, config: SharedConfig) -> Self {
        Self {
            channel,
            config,
            events: EventFlags::new(),
            state: SubtitleState::Idle,
            front: None,
            row: 1,
            repeats_left: 0,
            caption: [b' '; CAPTION_SIZE],
        }
    }

    /// True while a page is being sent.
    pub fn is_active(&self) -> bool {
        self.state != SubtitleState::Idle
    }

    fn swap_in(&mut self) {
        let Some(page) = self.channel.try_take() else {
            return;
        };
        let repeats = match self.config.try_read() {
            Some(config) => {
                self.caption = config.header.caption_bytes();
                config.subtitle.repeats
            }
            None => 1,
        };
        debug!("Subtitle page {} taken, {} repeats", page.number(), repeats.max(1));
        self.front = Some(page);
        self.repeats_left = repeats.max(1);
        self.state = SubtitleState::Header;
    }

    fn send_header(&mut self, packet: &mut Packet) -> bool {
        let Some(page) = self.front.as_ref() else {
            self.state = SubtitleState::Idle;
            return false;
        };
        let number = page.number();
        let subpage = page.current();
        packet.header(
            number.magazine(),
            number.page(),
            subpage.subcode,
            subpage.status | status::ERASE | status::SUBTITLE,
            &self.caption,
        );
        self.row = 1;
        self.state = SubtitleState::TextRow;
        true
    }

    fn send_row(&mut self, packet: &mut Packet) -> bool {
        if let Some(page) = self.front.as_ref() {
            let number = page.number();
            let subpage = page.current();
            while self.row <= LAST_TEXT_ROW {
                let row = self.row;
                self.row += 1;
                if let Some(text) = subpage.row(row) {
                    packet.set_row(number.magazine(), row, text, Coding::Parity7);
                    return true;
                }
            }
        }

        self.repeats_left = self.repeats_left.saturating_sub(1);
        if self.repeats_left > 0 {
            trace!("Subtitle repeat, {} left", self.repeats_left);
            self.state = SubtitleState::Header;
            return self.send_header(packet);
        }
        self.state = SubtitleState::Idle;
        self.front = None;
        false
    }
}

impl PacketSource for SubtitleSource {
    fn name(&self) -> &str {
        "subtitle"
    }

    fn events(&mut self) -> &mut EventFlags {
        &mut self.events
    }

    fn is_ready(&mut self, _force: bool) -> bool {
        if self.events.take(Event::SubtitleReady) && self.state == SubtitleState::Idle {
            self.swap_in();
        }
        self.is_active()
    }

    fn get_packet(&mut self, packet: &mut Packet) -> bool {
        match self.state {
            SubtitleState::Idle => false,
            SubtitleState::Header => self.send_header(packet),
            SubtitleState::TextRow => self.send_row(packet),
        }
    }

    fn line_kind(&self) -> LineKind {
        LineKind::Subtitle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::page::model::Subpage;
    use vbit_packet::hamming::decode_8_4;
    use vbit_packet::PageNumber;

    fn subtitle(text: &[u8]) -> Page {
        let mut sub = Subpage::new();
        sub.set_row(22, text);
        sub.set_row(23, text);
        Page::new(PageNumber::new(8, 0x88), sub)
    }

    fn drain(source: &mut SubtitleSource) -> Vec<Packet> {
        let mut sent = Vec::new();
        while source.is_ready(false) {
            let mut packet = Packet::new();
            if !source.get_packet(&mut packet) {
                break;
            }
            sent.push(packet);
        }
        sent
    }

    #[test]
    fn test_idle_until_submitted() {
        let channel = SubtitleChannel::new();
        let mut source = SubtitleSource::new(channel.clone(), SharedConfig::default());
        source.events().set(Event::SubtitleReady);
        assert!(!source.is_ready(false));

        channel.submit(subtitle(b"Hello"));
        assert!(channel.has_pending());
        // Taken only on the next cue.
        assert!(!source.is_ready(false));
        source.events().set(Event::SubtitleReady);
        assert!(source.is_ready(false));
        assert!(!channel.has_pending());
    }

    #[test]
    fn test_header_flags_and_rows() {
        let channel = SubtitleChannel::new();
        let mut source = SubtitleSource::new(channel.clone(), SharedConfig::default());
        channel.submit(subtitle(b"Hello"));
        source.events().set(Event::SubtitleReady);

        let sent = drain(&mut source);
        let rows: Vec<u8> = sent.iter().map(|p| p.row()).collect();
        assert_eq!(rows, vec![0, 22, 23]);
        assert_eq!(sent[0].magazine(), 0);
        let b = sent[0].bytes();
        assert_eq!(decode_8_4(b[8]).map(|n| n & 0x08), Some(0x08));
        assert_eq!(decode_8_4(b[10]).map(|n| n & 0x08), Some(0x08));
        assert!(!source.is_active());
    }

    #[test]
    fn test_repeat_count() {
        let mut config = Config::default();
        config.subtitle.repeats = 3;
        let channel = SubtitleChannel::new();
        let mut source = SubtitleSource::new(channel.clone(), SharedConfig::new(config));
        channel.submit(subtitle(b"Again"));
        source.events().set(Event::SubtitleReady);

        let sent = drain(&mut source);
        assert_eq!(sent.iter().filter(|p| p.is_header()).count(), 3);
        assert_eq!(sent.len(), 9);
        assert_eq!(source.line_kind(), LineKind::Subtitle);
    }

    #[test]
    fn test_newest_submission_wins() {
        let channel = SubtitleChannel::new();
        channel.submit(subtitle(b"First"));
        channel.submit(subtitle(b"Second"));
        let page = channel.try_take().unwrap();
        assert_eq!(&page.current().row(22).unwrap()[..6], b"Second");
        assert!(channel.try_take().is_none());
    }
}
