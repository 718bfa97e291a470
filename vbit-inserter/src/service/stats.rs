//! Magazine cycle statistics.

use std::sync::atomic::{AtomicU64, Ordering};

const UNSET: u64 = u64::MAX;

#[derive(Debug)]
struct MagazineCycle {
    /// Field the running pass started at.
    started: AtomicU64,
    /// Length of the last full pass in fields.
    last: AtomicU64,
}

impl Default for MagazineCycle {
    fn default() -> Self {
        Self {
            started: AtomicU64::new(UNSET),
            last: AtomicU64::new(UNSET),
        }
    }
}

/// Rotation timing per magazine, written by the sequencers and read by the
/// diagnostics source.
#[derive(Debug, Default)]
pub struct CycleStats {
    magazines: [MagazineCycle; 8],
    fillers: AtomicU64,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// The normal rotation of `magazine` wrapped at field `now`.
    pub fn cycle_complete(&self, magazine: u8, now: u64) {
        let cycle = &self.magazines[(magazine & 0x07) as usize];
        let started = cycle.started.swap(now, Ordering::AcqRel);
        if started != UNSET && now >= started {
            cycle.last.store(now - started, Ordering::Release);
        }
    }

    pub fn last_cycle_fields(&self, magazine: u8) -> Option<u64> {
        match self.magazines[(magazine & 0x07) as usize].last.load(Ordering::Acquire) {
            UNSET => None,
            fields => Some(fields),
        }
    }

    /// Last full cycle in whole seconds; 0 before the first one completed.
    pub fn last_cycle_seconds(&self, magazine: u8, fields_per_second: u32) -> u64 {
        self.last_cycle_fields(magazine)
            .map(|f| f / fields_per_second.max(1) as u64)
            .unwrap_or(0)
    }

    pub fn count_filler(&self) {
        self.fillers.fetch_add(1, Ordering::Relaxed);
    }

    /// Filler packets sent since startup.
    pub fn fillers(&self) -> u64 {
        self.fillers.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_duration() {
        let stats = CycleStats::new();
        assert_eq!(stats.last_cycle_fields(1), None);
        stats.cycle_complete(1, 1000);
        assert_eq!(stats.last_cycle_fields(1), None);
        stats.cycle_complete(1, 2500);
        assert_eq!(stats.last_cycle_fields(1), Some(1500));
        assert_eq!(stats.last_cycle_seconds(1, 50), 30);
        assert_eq!(stats.last_cycle_seconds(2, 50), 0);
    }

    #[test]
    fn test_filler_count() {
        let stats = CycleStats::new();
        stats.count_filler();
        stats.count_filler();
        assert_eq!(stats.fillers(), 2);
    }
}
