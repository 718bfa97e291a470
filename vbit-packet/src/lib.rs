//! Teletext packet encoding for the vbit inserter.
//!
//! This crate builds the 45-byte transmission units of ETS 300 706 teletext
//! from logical page, row and service data, and wraps them in the supported
//! output containers.
//!
//! # Packet Format
//!
//! ```text
//! +--------+--------+--------+--------------------------+
//! | CRI    | FC     | MRAG   |         Payload          |
//! | 55 55  | 27     | H84 x 2|  40 bytes, per coding    |
//! +--------+--------+--------+--------------------------+
//! | 2 bytes| 1 byte | 2 bytes|        40 bytes          |
//! ```
//!
//! # Example
//!
//! ```rust
//! use vbit_packet::{Packet, TemplateContext};
//!
//! let mut packet = Packet::new();
//! packet.header(1, 0x00, 0x0000, 0, b"Teletext %H:%M");
//! let context = TemplateContext::now("0.1", "");
//! let bytes = packet.tx(&context);
//! assert_eq!(bytes.len(), 45);
//! assert_eq!(bytes[5], 0x15);
//! ```

pub mod control;
pub mod crc;
pub mod error;
pub mod framing;
pub mod hamming;
pub mod idl;
pub mod packet;
pub mod template;
pub mod types;

pub use control::{modified_julian_day, Format1, PdcLabel, STATUS_SIZE};
pub use crc::{IdlCrc, PageCrc};
pub use error::PacketError;
pub use framing::{t42, OutputFormat, PesFramer};
pub use idl::{Continuity, IdlA};
pub use packet::{Packet, PACKET_SIZE, PAYLOAD_SIZE, TRIPLETS};
pub use template::TemplateContext;
pub use types::{clamp_subcode, status, Coding, PageFunction, PageNumber, MAX_SUBCODE};
