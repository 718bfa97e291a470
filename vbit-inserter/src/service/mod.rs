//! The packet service: sources that produce packets and the scheduler that
//! interleaves them into fields.
//!
//! ```text
//!  subtitle  8/30  datacast  debug        magazine 1 .. magazine 8
//!     \       |       |       /               \     ...     /
//!      priority sources (first ready)    rotation with countdowns
//!                    \                          /
//!                     +------- Scheduler ------+---> PacketSink
//! ```

pub mod control;
pub mod datacast;
pub mod debug;
pub mod events;
pub mod magazine;
pub mod scheduler;
pub mod stats;
pub mod subtitle;

use vbit_packet::{Packet, TemplateContext};

use crate::output::LineKind;

pub use control::Control830Source;
pub use datacast::{DatacastChannels, DatacastSource, PushResult};
pub use debug::DebugSource;
pub use events::{Event, EventFlags};
pub use magazine::MagazineSequencer;
pub use scheduler::Scheduler;
pub use stats::CycleStats;
pub use subtitle::{SubtitleChannel, SubtitleSource};

/// Something that can fill a line.
///
/// Calls never block: a source that cannot make progress reports that it is
/// not ready, or returns false from [`PacketSource::get_packet`].
pub trait PacketSource {
    fn name(&self) -> &str;

    /// Events set by the scheduler and not yet consumed.
    fn events(&mut self) -> &mut EventFlags;

    /// True when the source wants the next line. `force` overrides any
    /// priority countdown.
    fn is_ready(&mut self, force: bool) -> bool;

    /// Build the next packet into `packet`. Returns false when nothing was
    /// built after all.
    fn get_packet(&mut self, packet: &mut Packet) -> bool;

    /// Template values for the field about to be sent.
    fn set_context(&mut self, _context: &TemplateContext) {}

    fn line_kind(&self) -> LineKind {
        LineKind::Page
    }
}
