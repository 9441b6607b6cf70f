//! Error types for TS packet decoding and PES reassembly.

use thiserror::Error;

/// Errors that can occur while decoding TS structures or assembling PES units.
#[derive(Error, Debug)]
pub enum TsPesError {
    /// An I/O error occurred while delivering a completed unit.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// First byte of a packet is not the 0x47 sync byte.
    #[error("invalid sync byte: expected 0x47, got {0:#04x}")]
    InvalidSyncByte(u8),

    /// A slice is shorter than the structure being decoded requires.
    #[error("insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData {
        /// Number of bytes the decoder needed.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// PES packet does not begin with the 0x000001 start code prefix.
    #[error("invalid PES start code: expected 0x000001??, got {0:#010x}")]
    InvalidStartCodePrefix(u32),

    /// Flagged adaptation sub-fields read past the declared field length.
    #[error("adaptation field overrun: declared {declared} bytes, {available} available")]
    AdaptationFieldOverrun {
        /// Bytes the flagged sub-fields require.
        declared: usize,
        /// Bytes actually present inside the declared length.
        available: usize,
    },

    /// Growing the unit accumulation buffer failed.
    #[error("failed to reserve {requested} bytes for a PES unit")]
    BufferAlloc {
        /// Capacity the assembler asked for.
        requested: usize,
        /// Underlying allocator error.
        #[source]
        source: std::collections::TryReserveError,
    },
}
