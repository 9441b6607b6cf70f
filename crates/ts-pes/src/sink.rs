use std::io::Write;

use crate::Result;
use crate::pes::PesHeader;

/// Delivery seam for completed PES units.
///
/// The driver calls `deliver` when the assembler reports a finished unit;
/// what happens to the bytes (file, codec, discard) is the sink's business.
pub trait PesSink {
    fn deliver(&mut self, header: &PesHeader, payload: &[u8]) -> Result<()>;
}

/// Sink that appends each delivered unit's payload to a writer.
#[derive(Debug)]
pub struct WriteSink<W: Write> {
    inner: W,
    units: u64,
    bytes: u64,
}

impl<W: Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        WriteSink {
            inner,
            units: 0,
            bytes: 0,
        }
    }

    /// Units delivered so far.
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Payload bytes written so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> PesSink for WriteSink<W> {
    fn deliver(&mut self, _header: &PesHeader, payload: &[u8]) -> Result<()> {
        self.inner.write_all(payload)?;
        self.units += 1;
        self.bytes += payload.len() as u64;
        Ok(())
    }
}
