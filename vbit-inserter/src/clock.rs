//! Master field clock.
//!
//! The clock counts video fields since the Unix epoch. The scheduler thread is
//! the only writer and advances it once per field; every other component reads
//! it through a shared `Arc<MasterClock>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default field rate (625-line systems).
pub const DEFAULT_FIELDS_PER_SECOND: u32 = 50;

#[derive(Debug)]
pub struct MasterClock {
    fields: AtomicU64,
    fields_per_second: u32,
}

impl MasterClock {
    /// Create a clock set to the current wall-clock time.
    pub fn new(fields_per_second: u32) -> Self {
        let clock = Self::starting_at(0, fields_per_second);
        clock.set_fields(clock.wall_fields());
        clock
    }

    /// Create a clock set to `seconds` since the epoch.
    pub fn starting_at(seconds: u64, fields_per_second: u32) -> Self {
        let fields_per_second = fields_per_second.max(1);
        Self {
            fields: AtomicU64::new(seconds * fields_per_second as u64),
            fields_per_second,
        }
    }

    pub fn fields_per_second(&self) -> u32 {
        self.fields_per_second
    }

    /// Fields since the epoch.
    pub fn fields(&self) -> u64 {
        self.fields.load(Ordering::Acquire)
    }

    /// Whole seconds since the epoch.
    pub fn seconds(&self) -> u64 {
        self.fields() / self.fields_per_second as u64
    }

    /// Field number within the current second.
    pub fn field_in_second(&self) -> u32 {
        (self.fields() % self.fields_per_second as u64) as u32
    }

    /// Advance by one field and return the new count.
    pub fn advance_field(&self) -> u64 {
        self.fields.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn set_fields(&self, fields: u64) {
        self.fields.store(fields, Ordering::Release);
    }

    /// Duration of one field.
    pub fn field_duration(&self) -> Duration {
        Duration::from_secs(1) / self.fields_per_second
    }

    /// Wall-clock time in fields since the epoch.
    pub fn wall_fields(&self) -> u64 {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        elapsed.as_secs() * self.fields_per_second as u64
            + (elapsed.subsec_nanos() as u64 * self.fields_per_second as u64) / 1_000_000_000
    }
}
