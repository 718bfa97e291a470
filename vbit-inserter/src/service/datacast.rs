//! Datacast: application data on independent data lines.
//!
//! Producers push data into per-channel buffers through [`DatacastChannels`];
//! the [`DatacastSource`] drains them round-robin, a few packets per field.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;
use vbit_packet::idl::MAX_CHANNEL;
use vbit_packet::{IdlA, Packet};

use super::events::{Event, EventFlags};
use super::PacketSource;
use crate::config::SharedConfig;

const CHANNELS: usize = MAX_CHANNEL as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Ok,
    /// The channel's buffer is full; nothing was queued.
    BufferFull,
    /// Only this many bytes fitted in the packet.
    Truncated(usize),
    /// Channel 0 is reserved and channels above 15 do not exist.
    InvalidChannel,
}

/// Shared per-channel packet buffers for datachannels 1..=15.
#[derive(Debug, Clone)]
pub struct DatacastChannels {
    buffers: Arc<Mutex<Vec<VecDeque<Packet>>>>,
    capacity: usize,
}

impl DatacastChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(vec![VecDeque::new(); CHANNELS])),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue up to 40 bytes of raw data on `channel`.
    pub fn push_raw(&self, channel: u8, data: &[u8]) -> PushResult {
        self.push_with(channel, data.len(), |packet| {
            packet.set_raw(channel & 0x07, 30 + (channel >> 3), data)
        })
    }

    /// Queue one IDL format A packet on `channel`.
    pub fn push_idl_a(&self, channel: u8, idl: &IdlA<'_>) -> PushResult {
        self.push_with(channel, idl.data.len(), |packet| packet.idl_a(channel, idl))
    }

    fn push_with<F>(&self, channel: u8, length: usize, build: F) -> PushResult
    where
        F: FnOnce(&mut Packet) -> usize,
    {
        if channel == 0 || channel > MAX_CHANNEL {
            return PushResult::InvalidChannel;
        }
        let mut buffers = self.buffers.lock();
        let buffer = &mut buffers[channel as usize];
        if buffer.len() >= self.capacity {
            debug!("Datacast channel {} full ({} packets)", channel, buffer.len());
            return PushResult::BufferFull;
        }
        let mut packet = Packet::new();
        let consumed = build(&mut packet);
        buffer.push_back(packet);
        if consumed < length {
            PushResult::Truncated(consumed)
        } else {
            PushResult::Ok
        }
    }

    /// Packets waiting on `channel`.
    pub fn pending(&self, channel: u8) -> usize {
        self.buffers.lock().get(channel as usize).map_or(0, VecDeque::len)
    }

    /// Take the next packet, starting the search at channel `*next` and
    /// leaving `*next` after the channel served. `None` also while a
    /// producer holds the buffers.
    fn try_pop(&self, next: &mut usize) -> Option<Packet> {
        let mut buffers = self.buffers.try_lock()?;
        for _ in 0..CHANNELS {
            let channel = *next;
            *next = (*next + 1) % CHANNELS;
            if let Some(packet) = buffers[channel].pop_front() {
                return Some(packet);
            }
        }
        None
    }

    fn try_has_data(&self) -> Option<bool> {
        let buffers = self.buffers.try_lock()?;
        Some(buffers.iter().any(|b| !b.is_empty()))
    }
}

#[derive(Debug)]
pub struct DatacastSource {
    channels: DatacastChannels,
    config: SharedConfig,
    events: EventFlags,
    lines_per_field: usize,
    sent_this_field: usize,
    has_data: bool,
    next_channel: usize,
}

impl DatacastSource {
    pub fn new(channels: DatacastChannels, config: SharedConfig) -> Self {
        let lines_per_field = config.read().datacast.lines_per_field;
        Self {
            channels,
            config,
            events: EventFlags::new(),
            lines_per_field,
            sent_this_field: 0,
            has_data: false,
            next_channel: 1,
        }
    }
}

impl PacketSource for DatacastSource {
    fn name(&self) -> &str {
        "datacast"
    }

    fn events(&mut self) -> &mut EventFlags {
        &mut self.events
    }

    fn is_ready(&mut self, _force: bool) -> bool {
        if self.events.take(Event::DatacastReady) {
            if let Some(config) = self.config.try_read() {
                self.lines_per_field = config.datacast.lines_per_field;
            }
            self.sent_this_field = 0;
            self.has_data = self.channels.try_has_data().unwrap_or(self.has_data);
        }
        self.has_data && self.sent_this_field < self.lines_per_field
    }

    fn get_packet(&mut self, packet: &mut Packet) -> bool {
        match self.channels.try_pop(&mut self.next_channel) {
            Some(next) => {
                *packet = next;
                self.sent_this_field += 1;
                true
            }
            None => {
                trace!("Datacast buffers empty or busy");
                self.has_data = false;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use vbit_packet::Continuity;

    #[test]
    fn test_buffer_full_keeps_earlier_entries() {
        let channels = DatacastChannels::new(3);
        for i in 0..3u8 {
            assert_eq!(channels.push_raw(1, &[i; 10]), PushResult::Ok);
        }
        assert_eq!(channels.push_raw(1, &[9; 10]), PushResult::BufferFull);
        assert_eq!(channels.pending(1), 3);

        let mut next = 1;
        for i in 0..3u8 {
            let packet = channels.try_pop(&mut next).unwrap();
            assert_eq!(packet.bytes()[5], i);
            next = 1;
        }
        assert!(channels.try_pop(&mut next).is_none());
    }

    #[test]
    fn test_invalid_channel_and_truncation() {
        let channels = DatacastChannels::new(4);
        assert_eq!(channels.push_raw(0, b"x"), PushResult::InvalidChannel);
        assert_eq!(channels.push_raw(16, b"x"), PushResult::InvalidChannel);
        assert_eq!(channels.push_raw(2, &[0x11; 50]), PushResult::Truncated(40));

        let data = [0x42u8; 60];
        let idl = IdlA {
            continuity: Continuity::Explicit(1),
            data: &data,
            ..Default::default()
        };
        assert!(matches!(channels.push_idl_a(9, &idl), PushResult::Truncated(n) if n < 60));
        let mut next = 9;
        let packet = channels.try_pop(&mut next).unwrap();
        assert_eq!(packet.magazine(), 1);
        assert_eq!(packet.row(), 31);
    }

    #[test]
    fn test_source_budget_and_round_robin() {
        let mut config = Config::default();
        config.datacast.lines_per_field = 2;
        let channels = DatacastChannels::new(8);
        let mut source = DatacastSource::new(channels.clone(), SharedConfig::new(config));
        assert!(!source.is_ready(false));

        channels.push_raw(1, b"a1");
        channels.push_raw(1, b"a2");
        channels.push_raw(3, b"b1");
        source.events().set(Event::DatacastReady);
        assert!(source.is_ready(false));

        let mut packet = Packet::new();
        assert!(source.get_packet(&mut packet));
        assert_eq!(&packet.bytes()[5..7], b"a1");
        assert!(source.is_ready(false));
        assert!(source.get_packet(&mut packet));
        assert_eq!(&packet.bytes()[5..7], b"b1");
        assert!(!source.is_ready(false));

        source.events().set(Event::DatacastReady);
        assert!(source.is_ready(false));
        assert!(source.get_packet(&mut packet));
        assert_eq!(&packet.bytes()[5..7], b"a2");
        assert!(!source.get_packet(&mut packet));
        assert!(!source.is_ready(false));
    }
}
