//! Timing events broadcast by the scheduler.
//!
//! At the first line of every field the scheduler works out which events
//! fire and sets them in every source's [`EventFlags`]. Sources poll and
//! clear their own copy.

/// Fields between the 8/30 sub-phases.
pub const CONTROL_PHASE_FIELDS: u32 = 10;
/// Seconds between M/29 transmissions.
pub const PACKET_29_PERIOD_SECONDS: u64 = 10;
/// Seconds between special page passes.
pub const SPECIAL_PAGES_PERIOD_SECONDS: u64 = 10;
/// Offset of the special page pass within its period, so it does not land
/// on the same field as M/29.
const SPECIAL_PAGES_OFFSET_SECONDS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A new field started.
    Field,
    Control830Format1,
    Control830Label0,
    Control830Label1,
    Control830Label2,
    Control830Label3,
    /// Check the subtitle channel for a new page.
    SubtitleReady,
    /// Check the datacast channels and reset the per-field budget.
    DatacastReady,
    /// Start a pass over the special pages.
    SpecialPages,
    /// Send the magazine-level M/29 packets.
    Packet29,
}

impl Event {
    fn bit(self) -> u16 {
        1 << self as u16
    }

    /// The 8/30 format 2 event for PDC label `index` (0..=3).
    pub fn label(index: usize) -> Option<Event> {
        match index {
            0 => Some(Event::Control830Label0),
            1 => Some(Event::Control830Label1),
            2 => Some(Event::Control830Label2),
            3 => Some(Event::Control830Label3),
            _ => None,
        }
    }
}

/// A set of pending events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFlags(u16);

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, event: Event) {
        self.0 |= event.bit();
    }

    pub fn clear(&mut self, event: Event) {
        self.0 &= !event.bit();
    }

    pub fn is_set(&self, event: Event) -> bool {
        self.0 & event.bit() != 0
    }

    /// Clear `event` and return whether it was set.
    pub fn take(&mut self, event: Event) -> bool {
        let set = self.is_set(event);
        self.clear(event);
        set
    }

    /// Add every event set in `other`.
    pub fn merge(&mut self, other: EventFlags) {
        self.0 |= other.0;
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Events that fire at the start of field `fields` (counted from the epoch).
pub fn field_events(fields: u64, fields_per_second: u32) -> EventFlags {
    let fields_per_second = fields_per_second.max(1);
    let in_second = (fields % fields_per_second as u64) as u32;
    let seconds = fields / fields_per_second as u64;

    let mut events = EventFlags::new();
    events.set(Event::Field);
    events.set(Event::SubtitleReady);
    events.set(Event::DatacastReady);

    if in_second % CONTROL_PHASE_FIELDS == 0 {
        let phase = (in_second / CONTROL_PHASE_FIELDS) as usize;
        if phase == 0 {
            events.set(Event::Control830Format1);
        } else if let Some(label) = Event::label(phase - 1) {
            events.set(label);
        }
    }

    if in_second == 0 {
        if seconds % PACKET_29_PERIOD_SECONDS == 0 {
            events.set(Event::Packet29);
        }
        if seconds % SPECIAL_PAGES_PERIOD_SECONDS == SPECIAL_PAGES_OFFSET_SECONDS {
            events.set(Event::SpecialPages);
        }
    }
    events
}
