use tracing::{debug, trace};

use crate::adaptation_field::AdaptationField;
use crate::packet::{TS_HEADER_SIZE, TsPacketHeader};
use crate::pes::PesHeader;
use crate::{Result, TsPesError};

/// Outcome of the per-packet continuity-counter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityStatus {
    /// First packet seen for the PID; nothing to compare against.
    Initial,
    /// Counter in sequence.
    Ok,
    /// Repeated counter on a payload packet; one retransmission allowed.
    Duplicate,
    /// Counter broke sequence.
    Discontinuity { expected: u8, actual: u8 },
}

/// What one absorbed TS packet produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyEvent {
    /// A new PES unit was opened.
    Started,
    /// Continuation bytes appended, unit still incomplete.
    Continue,
    /// The unit reached its declared size; accessors expose it until the
    /// next absorb call that starts or extends a unit.
    Finished,
    /// Continuity counter broke sequence; assembly continues.
    Discontinuity { expected: u8, actual: u8 },
    /// Retransmitted packet, ignored wholesale.
    Duplicate,
    /// A unit was superseded before reaching its declared size.
    Truncated { expected: usize, received: usize },
    /// More payload arrived than declared; the excess was discarded.
    Overflow { expected: usize, discarded: usize },
    /// PES_packet_length = 0; the unit is skipped, not assembled.
    UnboundedLengthUnsupported,
    /// A unit-start packet whose payload cannot yield a usable PES header.
    MalformedHeader,
    /// Continuation payload with no unit in progress, dropped.
    UnexpectedPayload,
}

/// Reassembles the PES units of one PID from its TS packets.
///
/// One assembler per PID, fed packets in stream arrival order; PID
/// filtering is the driver's job. Single-threaded: `absorb` is the only
/// mutating entry point and each call completes before the next.
#[derive(Debug)]
pub struct PesAssembler {
    pid: u16,
    last_cc: Option<u8>,
    /// Accumulation buffer; storage is reused across units, logical
    /// content never spans two units.
    buffer: Vec<u8>,
    expected: usize,
    header: Option<PesHeader>,
    assembling: bool,
}

impl PesAssembler {
    /// Create an assembler for one PID.
    pub fn new(pid: u16) -> Self {
        PesAssembler {
            pid,
            last_cc: None,
            buffer: Vec::new(),
            expected: 0,
            header: None,
            assembling: false,
        }
    }

    /// Absorb one TS packet of this assembler's PID.
    ///
    /// Returns the events the packet produced, in order; `Finished` is
    /// always the last event of the call that emits it. Decode problems
    /// are reported as events and leave the assembler ready for the next
    /// packet; only buffer allocation failure is an `Err`.
    pub fn absorb(
        &mut self,
        packet: &[u8],
        header: &TsPacketHeader,
        adaptation_field: Option<&AdaptationField>,
    ) -> Result<Vec<AssemblyEvent>> {
        debug_assert_eq!(header.pid, self.pid, "packet routed to wrong assembler");

        let mut events = Vec::new();

        match self.check_cc(header) {
            ContinuityStatus::Initial | ContinuityStatus::Ok => {}
            ContinuityStatus::Duplicate => {
                trace!(
                    pid = self.pid,
                    cc = header.continuity_counter,
                    "duplicate packet ignored"
                );
                events.push(AssemblyEvent::Duplicate);
                return Ok(events);
            }
            ContinuityStatus::Discontinuity { expected, actual } => {
                // A signaled discontinuity legitimizes the jump.
                let signaled =
                    adaptation_field.is_some_and(|af| af.discontinuity_indicator);
                if !signaled {
                    debug!(pid = self.pid, expected, actual, "continuity break");
                    events.push(AssemblyEvent::Discontinuity { expected, actual });
                }
            }
        }

        // Payload offset follows the raw length byte so it survives
        // adaptation-field decode failures.
        let mut offset = TS_HEADER_SIZE;
        if header.has_adaptation_field() && offset < packet.len() {
            offset += 1 + packet[offset] as usize;
        }
        if !header.has_payload() || offset >= packet.len() {
            return Ok(events);
        }
        let payload = &packet[offset..];

        if header.payload_unit_start_indicator {
            self.start_unit(payload, &mut events)?;
        } else if self.assembling {
            self.append(payload, &mut events);
        } else {
            trace!(
                pid = self.pid,
                len = payload.len(),
                "payload with no unit in progress"
            );
            events.push(AssemblyEvent::UnexpectedPayload);
        }

        Ok(events)
    }

    /// Report an incomplete in-progress unit at end-of-stream.
    ///
    /// The unit is discarded, not delivered.
    pub fn finish(&mut self) -> Vec<AssemblyEvent> {
        if !self.assembling {
            return Vec::new();
        }
        self.assembling = false;
        vec![AssemblyEvent::Truncated {
            expected: self.expected,
            received: self.buffer.len(),
        }]
    }

    fn start_unit(&mut self, payload: &[u8], events: &mut Vec<AssemblyEvent>) -> Result<()> {
        if self.assembling {
            self.assembling = false;
            events.push(AssemblyEvent::Truncated {
                expected: self.expected,
                received: self.buffer.len(),
            });
        }

        let pes_header = match PesHeader::parse(payload) {
            Ok(h) => h,
            Err(e) => {
                debug!(pid = self.pid, error = %e, "unusable PES header at unit start");
                events.push(AssemblyEvent::MalformedHeader);
                return Ok(());
            }
        };

        if pes_header.pes_packet_length == 0 {
            debug!(pid = self.pid, "unbounded PES packet length, unit skipped");
            events.push(AssemblyEvent::UnboundedLengthUnsupported);
            return Ok(());
        }

        let Some(expected) = pes_header.declared_payload_len() else {
            debug!(
                pid = self.pid,
                pes_packet_length = pes_header.pes_packet_length,
                pes_header_data_length = pes_header.pes_header_data_length,
                "internally inconsistent PES lengths, unit skipped"
            );
            events.push(AssemblyEvent::MalformedHeader);
            return Ok(());
        };

        // Header spill across TS packets is not tracked.
        if pes_header.header_len > payload.len() {
            debug!(
                pid = self.pid,
                header_len = pes_header.header_len,
                payload_len = payload.len(),
                "PES header exceeds first packet's payload, unit skipped"
            );
            events.push(AssemblyEvent::MalformedHeader);
            return Ok(());
        }

        self.buffer.clear();
        if let Err(source) = self.buffer.try_reserve_exact(expected) {
            return Err(TsPesError::BufferAlloc {
                requested: expected,
                source,
            });
        }
        self.expected = expected;
        self.assembling = true;

        trace!(
            pid = self.pid,
            stream_id = pes_header.stream_id.as_u8(),
            expected,
            "PES unit started"
        );
        let header_len = pes_header.header_len;
        self.header = Some(pes_header);
        events.push(AssemblyEvent::Started);

        self.append(&payload[header_len..], events);
        Ok(())
    }

    fn append(&mut self, data: &[u8], events: &mut Vec<AssemblyEvent>) {
        let remaining = self.expected - self.buffer.len();
        let take = data.len().min(remaining);
        self.buffer.extend_from_slice(&data[..take]);

        if data.len() > remaining {
            debug!(
                pid = self.pid,
                expected = self.expected,
                discarded = data.len() - remaining,
                "payload overflows declared unit size"
            );
            events.push(AssemblyEvent::Overflow {
                expected: self.expected,
                discarded: data.len() - remaining,
            });
        }

        if self.buffer.len() == self.expected {
            self.assembling = false;
            trace!(pid = self.pid, len = self.expected, "PES unit finished");
            events.push(AssemblyEvent::Finished);
        } else if !events.ends_with(&[AssemblyEvent::Started]) {
            events.push(AssemblyEvent::Continue);
        }
    }

    fn check_cc(&mut self, header: &TsPacketHeader) -> ContinuityStatus {
        let cc = header.continuity_counter;
        let Some(last) = self.last_cc else {
            self.last_cc = Some(cc);
            return ContinuityStatus::Initial;
        };

        if header.has_payload() {
            let expected = (last + 1) & 0x0F;
            if cc == expected {
                self.last_cc = Some(cc);
                ContinuityStatus::Ok
            } else if cc == last {
                ContinuityStatus::Duplicate
            } else {
                self.last_cc = Some(cc);
                ContinuityStatus::Discontinuity {
                    expected,
                    actual: cc,
                }
            }
        } else if cc == last {
            // No payload: the counter must repeat, not increment.
            ContinuityStatus::Ok
        } else {
            self.last_cc = Some(cc);
            ContinuityStatus::Discontinuity {
                expected: last,
                actual: cc,
            }
        }
    }

    /// PID this assembler serves.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Whether a unit is in progress (incomplete).
    pub fn is_assembling(&self) -> bool {
        self.assembling
    }

    /// Bytes accumulated for the current or just-finished unit.
    pub fn bytes_written(&self) -> usize {
        self.buffer.len()
    }

    /// The filled part of the accumulation buffer.
    ///
    /// After `Finished` this is the completed unit, valid until the next
    /// absorb call that starts or extends a unit; copy for longer
    /// retention.
    pub fn current_buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// PES header of the current or just-finished unit.
    pub fn header(&self) -> Option<&PesHeader> {
        self.header.as_ref()
    }
}
