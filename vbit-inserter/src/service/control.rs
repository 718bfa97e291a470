//! Broadcast service data (packet 8/30).

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, Offset};
use log::trace;
use vbit_packet::{Format1, Packet};

use super::events::{Event, EventFlags};
use super::PacketSource;
use crate::clock::MasterClock;
use crate::config::{ControlSection, SharedConfig, MAX_PDC_LABELS};

/// Sends format 1 on the first 8/30 sub-phase of each second and one PDC
/// label on each of the next four.
#[derive(Debug)]
pub struct Control830Source {
    clock: Arc<MasterClock>,
    config: SharedConfig,
    control: ControlSection,
    events: EventFlags,
}

impl Control830Source {
    pub fn new(clock: Arc<MasterClock>, config: SharedConfig) -> Self {
        let control = config.read().control.clone();
        Self {
            clock,
            config,
            control,
            events: EventFlags::new(),
        }
    }

    fn refresh(&mut self) {
        if let Some(config) = self.config.try_read() {
            self.control = config.control.clone();
        }
    }

    /// UTC time of the current field and the local offset in half hours.
    fn time(&self) -> (NaiveDateTime, i8) {
        let seconds = self.clock.seconds() as i64;
        let utc = DateTime::from_timestamp(seconds, 0).unwrap_or_default().naive_utc();
        let offset = self.control.time_offset_half_hours.unwrap_or_else(|| {
            let local = Local::now().offset().fix().local_minus_utc();
            (local / 1800) as i8
        });
        (utc, offset)
    }

    fn format1(&self, packet: &mut Packet) {
        let (utc, offset_half_hours) = self.time();
        let content = Format1 {
            multiplexed: self.control.multiplexed,
            initial_page: self.control.initial_page,
            initial_subcode: self.control.initial_subcode,
            network_id: self.control.network_id,
            utc,
            offset_half_hours,
            reserved: self.control.reserved,
            status: self.control.status_bytes(),
        };
        packet.control_830_format1(&content);
    }

    /// Drop label events for labels that are not configured.
    fn clear_unconfigured_labels(&mut self) {
        for index in self.control.pdc_labels.len()..MAX_PDC_LABELS {
            if let Some(event) = Event::label(index) {
                self.events.clear(event);
            }
        }
    }

    fn pending(&self) -> bool {
        self.events.is_set(Event::Control830Format1)
            || (0..MAX_PDC_LABELS).filter_map(Event::label).any(|e| self.events.is_set(e))
    }
}

impl PacketSource for Control830Source {
    fn name(&self) -> &str {
        "8/30"
    }

    fn events(&mut self) -> &mut EventFlags {
        &mut self.events
    }

    fn is_ready(&mut self, _force: bool) -> bool {
        if self.events.take(Event::Control830Format1) {
            self.refresh();
            self.events.set(Event::Control830Format1);
        }
        self.clear_unconfigured_labels();
        self.pending()
    }

    fn get_packet(&mut self, packet: &mut Packet) -> bool {
        if self.events.take(Event::Control830Format1) {
            self.format1(packet);
            return true;
        }
        for index in 0..MAX_PDC_LABELS {
            let Some(event) = Event::label(index) else {
                continue;
            };
            if !self.events.take(event) {
                continue;
            }
            let Some(label) = self.control.pdc_label(index) else {
                continue;
            };
            trace!("8/30 format 2 label {}", index);
            packet.control_830_format2(
                self.control.multiplexed,
                self.control.initial_page,
                self.control.initial_subcode,
                &label,
                &self.control.status_bytes(),
            );
            return true;
        }
        false
    }
}
