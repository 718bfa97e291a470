//! Teletext packet inserter.
//!
//! Pages are loaded from TTI files into a [`page::PageList`]. One sequencer
//! per magazine and a few auxiliary sources (subtitles, 8/30, datacast,
//! diagnostics) feed a [`service::Scheduler`], which paces fields against
//! the [`clock::MasterClock`] and writes them through an
//! [`output::PacketSink`].

pub mod clock;
pub mod config;
pub mod logging;
pub mod output;
pub mod page;
pub mod service;

pub use clock::MasterClock;
pub use config::{Config, ConfigError, SharedConfig};
pub use output::{LineKind, OutputError, PacketSink};
