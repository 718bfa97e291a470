//! Diagnostic packets on datachannel 8.
//!
//! Payload, big endian:
//!
//! | Bytes | Content |
//! |---|---|
//! | 0 | format, currently 1 |
//! | 1..5 | clock seconds |
//! | 5 | field within the second |
//! | 6..10 | wall clock seconds |
//! | 10..18 | last cycle of magazines 1..8 in seconds, capped at 255 |
//! | 18.. | version text |

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use vbit_packet::{Continuity, IdlA, Packet, PageNumber};

use super::events::{Event, EventFlags};
use super::stats::CycleStats;
use super::PacketSource;
use crate::clock::MasterClock;
use crate::config::SharedConfig;

pub const DEBUG_CHANNEL: u8 = 8;
const FORMAT: u8 = 1;

#[derive(Debug)]
pub struct DebugSource {
    clock: Arc<MasterClock>,
    config: SharedConfig,
    stats: Arc<CycleStats>,
    events: EventFlags,
    level: u8,
    pending: bool,
    continuity: u8,
}

impl DebugSource {
    pub fn new(clock: Arc<MasterClock>, config: SharedConfig, stats: Arc<CycleStats>) -> Self {
        let level = config.read().service.debug_level;
        Self {
            clock,
            config,
            stats,
            events: EventFlags::new(),
            level,
            pending: false,
            continuity: 0,
        }
    }

    fn payload(&self) -> Vec<u8> {
        let fields_per_second = self.clock.fields_per_second();
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut data = Vec::with_capacity(32);
        data.push(FORMAT);
        data.extend_from_slice(&(self.clock.seconds() as u32).to_be_bytes());
        data.push(self.clock.field_in_second() as u8);
        data.extend_from_slice(&(wall as u32).to_be_bytes());
        for digit in 1..=8u8 {
            let magazine = PageNumber::new(digit, 0).magazine();
            let seconds = self.stats.last_cycle_seconds(magazine, fields_per_second);
            data.push(seconds.min(255) as u8);
        }
        data.extend_from_slice(env!("CARGO_PKG_VERSION").as_bytes());
        data
    }
}

impl PacketSource for DebugSource {
    fn name(&self) -> &str {
        "debug"
    }

    fn events(&mut self) -> &mut EventFlags {
        &mut self.events
    }

    fn is_ready(&mut self, _force: bool) -> bool {
        if self.events.take(Event::Field) {
            if let Some(config) = self.config.try_read() {
                self.level = config.service.debug_level;
            }
            self.pending = self.level > 0;
        }
        self.pending
    }

    fn get_packet(&mut self, packet: &mut Packet) -> bool {
        if !self.pending {
            return false;
        }
        let data = self.payload();
        let idl = IdlA {
            address: 0,
            address_length: 1,
            continuity: Continuity::Implicit(self.continuity),
            data: &data,
            ..Default::default()
        };
        packet.idl_a(DEBUG_CHANNEL, &idl);
        self.continuity = self.continuity.wrapping_add(1);
        self.pending = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn source(level: u8) -> (DebugSource, Arc<CycleStats>) {
        let mut config = Config::default();
        config.service.debug_level = level;
        let stats = Arc::new(CycleStats::new());
        let source = DebugSource::new(
            Arc::new(MasterClock::starting_at(1_000, 50)),
            SharedConfig::new(config),
            stats.clone(),
        );
        (source, stats)
    }

    #[test]
    fn test_disabled_at_level_zero() {
        let (mut source, _) = source(0);
        source.events().set(Event::Field);
        assert!(!source.is_ready(false));
    }

    #[test]
    fn test_one_packet_per_field() {
        let (mut source, stats) = source(1);
        stats.cycle_complete(1, 0);
        stats.cycle_complete(1, 500);

        source.events().set(Event::Field);
        assert!(source.is_ready(false));
        let mut packet = Packet::new();
        assert!(source.get_packet(&mut packet));
        assert_eq!(packet.magazine(), 0);
        assert_eq!(packet.row(), 31);
        assert!(!source.is_ready(false));

        let data = source.payload();
        assert_eq!(data[0], FORMAT);
        assert_eq!(u32::from_be_bytes([data[1], data[2], data[3], data[4]]), 1_000);
        assert_eq!(data[10], 10);
        assert_eq!(data[11], 0);
    }
}
