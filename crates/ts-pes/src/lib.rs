//! MPEG Transport Stream packet decoding and PES reassembly
//!
//! This crate decodes the fixed 4-byte TS packet header, the optional
//! adaptation field (PCR/OPCR, splice countdown, private data, stuffing),
//! and PES packet headers, and reassembles one PID's payload into complete
//! PES units. The decoders are pure functions over byte slices; the
//! `PesAssembler` is the stateful core, tracking the continuity counter and
//! accumulating unit bytes across packets while emitting lifecycle events.

pub mod adaptation_field;
pub mod assembler;
pub mod error;
pub mod packet;
pub mod pes;
pub mod sink;

pub use adaptation_field::{AdaptationField, Pcr};
pub use assembler::{AssemblyEvent, ContinuityStatus, PesAssembler};
pub use error::TsPesError;
pub use packet::{
    AdaptationFieldControl, PID_CAT, PID_NIT, PID_NULL, PID_PAT, PID_SDT, PID_TSDT, SYNC_BYTE,
    TS_HEADER_SIZE, TS_PACKET_SIZE, TsPacketHeader,
};
pub use pes::{PesHeader, StreamId};
pub use sink::{PesSink, WriteSink};

/// Result type for TS decoding and PES assembly operations
pub type Result<T> = std::result::Result<T, TsPesError>;
