//! Error types for the teletext packet crate.
//!
//! Encoding itself never fails: out-of-range inputs are clamped or replaced
//! with sentinel values. These errors come from parsing textual inputs such as
//! page numbers and output format names.

use thiserror::Error;

/// Errors raised while parsing packet-level values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Page number is not three hex digits with magazine 1..=8.
    #[error("Invalid page number: {0:?}")]
    InvalidPageNumber(String),

    /// Output format name is not recognised.
    #[error("Unknown output format: {0:?} (expected raw, t42 or pes)")]
    UnknownOutputFormat(String),
}
