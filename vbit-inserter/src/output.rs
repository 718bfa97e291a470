//! Packet output in the configured container format.

use std::io::{self, Write};

use thiserror::Error;
use vbit_packet::{t42, OutputFormat, PesFramer, PACKET_SIZE};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output write failed: {0}")]
    Io(#[from] io::Error),
}

/// Where a line came from; decides its PES data unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Page,
    Subtitle,
    /// Padding with no content. Not carried in PES output.
    Filler,
}

/// Writes finished packets to `W`.
///
/// Raw and T42 lines are written as they arrive. PES lines are collected and
/// written as one PES packet by [`PacketSink::end_field`].
#[derive(Debug)]
pub struct PacketSink<W: Write> {
    writer: W,
    format: OutputFormat,
    reverse: bool,
    pes: PesFramer,
    first_field: bool,
}

impl<W: Write> PacketSink<W> {
    pub fn new(writer: W, format: OutputFormat, reverse: bool) -> Self {
        Self {
            writer,
            format,
            reverse,
            pes: PesFramer::new(),
            first_field: true,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Start field number `field`; even fields are first fields.
    pub fn begin_field(&mut self, field: u64) {
        self.first_field = field % 2 == 0;
    }

    pub fn write_line(&mut self, packet: &[u8; PACKET_SIZE], kind: LineKind) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Raw => self.writer.write_all(packet)?,
            OutputFormat::T42 => self.writer.write_all(&t42(packet, self.reverse))?,
            OutputFormat::Pes => {
                if kind != LineKind::Filler {
                    self.pes.push(packet, kind == LineKind::Subtitle, self.first_field);
                }
            }
        }
        Ok(())
    }

    /// Finish the field: emit the PES packet if any and flush.
    ///
    /// `pts` is the presentation time stamp in 90 kHz units.
    pub fn end_field(&mut self, pts: u64) -> Result<(), OutputError> {
        if self.format == OutputFormat::Pes {
            let packet = self.pes.finish(pts);
            self.writer.write_all(&packet)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
