//! Field scheduler.
//!
//! Every field the scheduler broadcasts the timing events, then fills each
//! line from the first ready priority source or, failing that, from the
//! magazine rotation. The rotation is scanned once normally and once with
//! `force`, so a line is decided after at most `2 * N` magazine attempts;
//! when that fails a filler packet goes out.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use log::{debug, info, trace, warn};
use vbit_packet::{Packet, TemplateContext};

use super::events::{field_events, EventFlags};
use super::stats::CycleStats;
use super::PacketSource;
use crate::clock::MasterClock;
use crate::config::SharedConfig;
use crate::output::{LineKind, OutputError, PacketSink};

/// PES time stamp rate.
const PTS_HZ: u64 = 90_000;

pub type BoxedSource = Box<dyn PacketSource + Send>;

pub struct Scheduler<W: Write> {
    clock: Arc<MasterClock>,
    config: SharedConfig,
    stats: Arc<CycleStats>,
    priority: Vec<BoxedSource>,
    magazines: Vec<BoxedSource>,
    next_magazine: usize,
    sink: PacketSink<W>,
    packet: Packet,
    context: TemplateContext,
    lines_per_field: usize,
}

impl<W: Write> Scheduler<W> {
    pub fn new(
        clock: Arc<MasterClock>,
        config: SharedConfig,
        stats: Arc<CycleStats>,
        sink: PacketSink<W>,
        address: impl Into<String>,
    ) -> Self {
        let lines_per_field = config.read().service.lines_per_field;
        Self {
            clock,
            config,
            stats,
            priority: Vec::new(),
            magazines: Vec::new(),
            next_magazine: 0,
            sink,
            packet: Packet::new(),
            context: TemplateContext::now(env!("CARGO_PKG_VERSION"), address),
            lines_per_field,
        }
    }

    /// Add a source that is asked before the magazines, in insertion order.
    pub fn add_priority_source(&mut self, source: BoxedSource) {
        self.priority.push(source);
    }

    pub fn add_magazine(&mut self, source: BoxedSource) {
        self.magazines.push(source);
    }

    pub fn into_sink(self) -> PacketSink<W> {
        self.sink
    }

    fn broadcast(&mut self, events: EventFlags) {
        for source in self.priority.iter_mut().chain(self.magazines.iter_mut()) {
            source.events().merge(events);
        }
    }

    /// Fill the packet buffer for the next line and say where it came from.
    pub fn next_line(&mut self) -> LineKind {
        for source in self.priority.iter_mut() {
            if source.is_ready(false) && source.get_packet(&mut self.packet) {
                return source.line_kind();
            }
        }

        let count = self.magazines.len();
        for attempt in 0..2 * count {
            let force = attempt >= count;
            let index = self.next_magazine;
            self.next_magazine = (index + 1) % count;
            let source = &mut self.magazines[index];
            if source.is_ready(force) && source.get_packet(&mut self.packet) {
                return source.line_kind();
            }
        }

        self.packet.filler();
        self.stats.count_filler();
        LineKind::Filler
    }

    /// Produce and write one field, then advance the clock.
    pub fn run_field(&mut self) -> Result<(), OutputError> {
        let fields = self.clock.fields();
        if let Some(config) = self.config.try_read() {
            self.lines_per_field = config.service.lines_per_field.max(1);
        }

        self.broadcast(field_events(fields, self.clock.fields_per_second()));
        self.context.now = Local::now().naive_local();
        for source in self.priority.iter_mut().chain(self.magazines.iter_mut()) {
            source.set_context(&self.context);
        }
        self.sink.begin_field(fields);

        let mut fillers = 0;
        for _ in 0..self.lines_per_field {
            let kind = self.next_line();
            if kind == LineKind::Filler {
                fillers += 1;
            }
            let bytes = self.packet.tx(&self.context);
            self.sink.write_line(bytes, kind)?;
        }
        if fillers > 0 {
            debug!("Field {}: {} filler lines", fields, fillers);
        }

        let pts = fields * PTS_HZ / self.clock.fields_per_second() as u64;
        self.sink.end_field(pts)?;
        self.clock.advance_field();
        Ok(())
    }

    /// Keep the clock within a field of wall time: wait when ahead, jump
    /// when more than a second behind.
    fn pace(&self) {
        let now = self.clock.fields();
        let wall = self.clock.wall_fields();
        if now > wall + 1 {
            trace!("Ahead of wall clock by {} fields, waiting", now - wall);
            std::thread::sleep(self.clock.field_duration());
        } else if wall > now + self.clock.fields_per_second() as u64 {
            warn!("Behind wall clock by {} fields, skipping ahead", wall - now);
            self.clock.set_fields(wall);
        }
    }

    /// Run until `shutdown` is set. Checked once per field.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), OutputError> {
        info!(
            "Scheduler started: {} magazines, {} priority sources, {} lines per field, {} output",
            self.magazines.len(),
            self.priority.len(),
            self.lines_per_field,
            self.sink.format()
        );
        while !shutdown.load(Ordering::Acquire) {
            self.run_field()?;
            self.pace();
        }
        info!("Scheduler stopped, {} filler packets sent", self.stats.fillers());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::page::model::{Page, Subpage};
    use crate::page::PageList;
    use crate::service::events::Event;
    use crate::service::{MagazineSequencer, SubtitleChannel, SubtitleSource};
    use std::sync::atomic::AtomicUsize;
    use vbit_packet::{OutputFormat, PageNumber, PACKET_SIZE};

    /// Ready only when forced; counts how often it was asked.
    struct Reluctant {
        events: EventFlags,
        asked: Arc<AtomicUsize>,
        magazine: u8,
    }

    impl PacketSource for Reluctant {
        fn name(&self) -> &str {
            "reluctant"
        }

        fn events(&mut self) -> &mut EventFlags {
            &mut self.events
        }

        fn is_ready(&mut self, force: bool) -> bool {
            self.asked.fetch_add(1, Ordering::Relaxed);
            force
        }

        fn get_packet(&mut self, packet: &mut Packet) -> bool {
            packet.set_row(self.magazine, 1, b"forced", vbit_packet::Coding::Parity7);
            true
        }
    }

    /// Never has anything to send.
    struct Silent {
        events: EventFlags,
        asked: Arc<AtomicUsize>,
    }

    impl PacketSource for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn events(&mut self) -> &mut EventFlags {
            &mut self.events
        }

        fn is_ready(&mut self, _force: bool) -> bool {
            self.asked.fetch_add(1, Ordering::Relaxed);
            true
        }

        fn get_packet(&mut self, _packet: &mut Packet) -> bool {
            false
        }
    }

    /// Ready whenever asked; `idle` makes it never ready.
    struct Steady {
        events: EventFlags,
        asked: Arc<AtomicUsize>,
        idle: bool,
        magazine: u8,
    }

    impl PacketSource for Steady {
        fn name(&self) -> &str {
            "steady"
        }

        fn events(&mut self) -> &mut EventFlags {
            &mut self.events
        }

        fn is_ready(&mut self, _force: bool) -> bool {
            self.asked.fetch_add(1, Ordering::Relaxed);
            !self.idle
        }

        fn get_packet(&mut self, packet: &mut Packet) -> bool {
            packet.set_row(self.magazine, 1, b"steady", vbit_packet::Coding::Parity7);
            true
        }
    }

    fn scheduler(config: Config) -> Scheduler<Vec<u8>> {
        let config = SharedConfig::new(config);
        let format = config.read().service.output;
        Scheduler::new(
            Arc::new(MasterClock::starting_at(1_000, 50)),
            config,
            Arc::new(CycleStats::new()),
            PacketSink::new(Vec::new(), format, false),
            "10.0.0.1",
        )
    }

    #[test]
    fn test_forced_scan_picks_a_magazine() {
        let mut scheduler = scheduler(Config::default());
        let asked = Arc::new(AtomicUsize::new(0));
        for magazine in 0..8 {
            scheduler.add_magazine(Box::new(Reluctant {
                events: EventFlags::new(),
                asked: asked.clone(),
                magazine,
            }));
        }
        assert_eq!(scheduler.next_line(), LineKind::Page);
        // One unforced scan, then the first forced attempt succeeds.
        assert_eq!(asked.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn test_filler_after_two_scans() {
        let mut scheduler = scheduler(Config::default());
        let asked = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            scheduler.add_magazine(Box::new(Silent {
                events: EventFlags::new(),
                asked: asked.clone(),
            }));
        }
        assert_eq!(scheduler.next_line(), LineKind::Filler);
        assert_eq!(asked.load(Ordering::Relaxed), 16);
        assert_eq!(scheduler.packet.row(), 25);
        assert_eq!(scheduler.stats.fillers(), 1);
    }

    #[test]
    fn test_ready_source_served_among_idle_ones() {
        for ready in [0usize, 3, 7] {
            let mut scheduler = scheduler(Config::default());
            let asked = Arc::new(AtomicUsize::new(0));
            for magazine in 0..8u8 {
                scheduler.add_magazine(Box::new(Steady {
                    events: EventFlags::new(),
                    asked: asked.clone(),
                    idle: magazine as usize != ready,
                    magazine,
                }));
            }
            for _ in 0..5 {
                asked.store(0, Ordering::Relaxed);
                assert_eq!(scheduler.next_line(), LineKind::Page);
                assert_eq!(scheduler.packet.magazine() as usize, ready);
                assert!(asked.load(Ordering::Relaxed) <= 2 * 8);
            }
        }
    }

    #[test]
    fn test_no_sources_sends_filler() {
        let mut scheduler = scheduler(Config::default());
        assert_eq!(scheduler.next_line(), LineKind::Filler);
    }

    #[test]
    fn test_events_broadcast_to_all_sources() {
        let mut scheduler = scheduler(Config::default());
        scheduler.add_magazine(Box::new(Silent {
            events: EventFlags::new(),
            asked: Arc::new(AtomicUsize::new(0)),
        }));
        let mut flags = EventFlags::new();
        flags.set(Event::Packet29);
        scheduler.broadcast(flags);
        assert!(scheduler.magazines[0].events().is_set(Event::Packet29));
    }

    #[test]
    fn test_field_output_and_clock() {
        let mut config = Config::default();
        config.service.lines_per_field = 4;
        let mut scheduler = scheduler(config);
        scheduler.run_field().unwrap();
        scheduler.run_field().unwrap();
        assert_eq!(scheduler.clock.fields(), 50_002);
        let out = scheduler.into_sink().into_inner();
        assert_eq!(out.len(), 8 * PACKET_SIZE);
    }

    #[test]
    fn test_subtitle_wins_over_magazines() {
        let config = SharedConfig::new(Config::default());
        let clock = Arc::new(MasterClock::starting_at(1_000, 50));
        let stats = Arc::new(CycleStats::new());
        let mut scheduler = Scheduler::new(
            clock.clone(),
            config.clone(),
            stats.clone(),
            PacketSink::new(Vec::new(), OutputFormat::Raw, false),
            "",
        );

        let pages = Arc::new(PageList::new());
        let mut sub = Subpage::new();
        sub.set_row(1, b"Page");
        pages.insert(Page::new(PageNumber::new(1, 0x00), sub));
        scheduler.add_magazine(Box::new(MagazineSequencer::new(1, pages, clock, config.clone(), stats)));

        let channel = SubtitleChannel::new();
        scheduler.add_priority_source(Box::new(SubtitleSource::new(channel.clone(), config)));
        let mut subtitle = Subpage::new();
        subtitle.set_row(22, b"Words");
        channel.submit(Page::new(PageNumber::new(8, 0x88), subtitle));

        let mut flags = EventFlags::new();
        flags.set(Event::SubtitleReady);
        scheduler.broadcast(flags);
        assert_eq!(scheduler.next_line(), LineKind::Subtitle);
        assert!(scheduler.packet.is_header());
        assert_eq!(scheduler.packet.magazine(), 0);
        assert_eq!(scheduler.next_line(), LineKind::Subtitle);
        assert_eq!(scheduler.packet.row(), 22);
        assert_eq!(scheduler.next_line(), LineKind::Page);
        assert_eq!(scheduler.packet.magazine(), 1);
    }
}
