use crate::{Result, TsPesError};

/// Length of a TS packet in bytes
pub const TS_PACKET_SIZE: usize = 188;

/// Length of the fixed TS packet header in bytes
pub const TS_HEADER_SIZE: usize = 4;

/// Sync byte that starts every TS packet
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID (always 0x0000)
pub const PID_PAT: u16 = 0x0000;

/// CAT PID (always 0x0001)
pub const PID_CAT: u16 = 0x0001;

/// TSDT PID (always 0x0002)
pub const PID_TSDT: u16 = 0x0002;

/// NIT PID (DVB, 0x0010)
pub const PID_NIT: u16 = 0x0010;

/// SDT PID (DVB, 0x0011)
pub const PID_SDT: u16 = 0x0011;

/// NULL PID (always 0x1FFF)
pub const PID_NULL: u16 = 0x1FFF;

/// Adaptation field control, the 2-bit field in byte 3 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationFieldControl {
    /// `00`: reserved for future use
    Reserved,
    /// `01`: payload only, no adaptation field
    PayloadOnly,
    /// `10`: adaptation field only, no payload
    AdaptationFieldOnly,
    /// `11`: adaptation field followed by payload
    AdaptationFieldAndPayload,
}

impl AdaptationFieldControl {
    /// Decode from the two low bits of a value.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0x01 => AdaptationFieldControl::PayloadOnly,
            0x02 => AdaptationFieldControl::AdaptationFieldOnly,
            0x03 => AdaptationFieldControl::AdaptationFieldAndPayload,
            _ => AdaptationFieldControl::Reserved,
        }
    }

    /// Encode back to the two-bit wire value.
    pub fn to_bits(self) -> u8 {
        match self {
            AdaptationFieldControl::Reserved => 0x00,
            AdaptationFieldControl::PayloadOnly => 0x01,
            AdaptationFieldControl::AdaptationFieldOnly => 0x02,
            AdaptationFieldControl::AdaptationFieldAndPayload => 0x03,
        }
    }

    /// Check if an adaptation field is present
    pub fn has_adaptation_field(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::AdaptationFieldOnly
                | AdaptationFieldControl::AdaptationFieldAndPayload
        )
    }

    /// Check if a payload is present
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::PayloadOnly | AdaptationFieldControl::AdaptationFieldAndPayload
        )
    }
}

/// Transport Stream packet header, the fixed first 4 bytes of every packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPacketHeader {
    /// Sync byte (always 0x47 after a successful parse)
    pub sync_byte: u8,
    /// Transport Error Indicator
    pub transport_error_indicator: bool,
    /// Payload Unit Start Indicator
    pub payload_unit_start_indicator: bool,
    /// Transport Priority
    pub transport_priority: bool,
    /// Packet Identifier
    pub pid: u16,
    /// Transport Scrambling Control
    pub transport_scrambling_control: u8,
    /// Adaptation Field Control
    pub adaptation_field_control: AdaptationFieldControl,
    /// Continuity Counter
    pub continuity_counter: u8,
}

impl TsPacketHeader {
    /// Parse a TS packet header from the first 4 bytes of a packet.
    ///
    /// The slice may be the whole 188-byte packet; only the header bytes are
    /// read and nothing is retained.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TS_HEADER_SIZE {
            return Err(TsPesError::InsufficientData {
                expected: TS_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let sync_byte = data[0];
        if sync_byte != SYNC_BYTE {
            return Err(TsPesError::InvalidSyncByte(sync_byte));
        }

        let byte1 = data[1];
        let byte2 = data[2];
        let byte3 = data[3];

        let transport_error_indicator = (byte1 & 0x80) != 0;
        let payload_unit_start_indicator = (byte1 & 0x40) != 0;
        let transport_priority = (byte1 & 0x20) != 0;
        let pid = ((byte1 as u16 & 0x1F) << 8) | byte2 as u16;

        let transport_scrambling_control = (byte3 >> 6) & 0x03;
        let adaptation_field_control = AdaptationFieldControl::from_bits((byte3 >> 4) & 0x03);
        let continuity_counter = byte3 & 0x0F;

        Ok(TsPacketHeader {
            sync_byte,
            transport_error_indicator,
            payload_unit_start_indicator,
            transport_priority,
            pid,
            transport_scrambling_control,
            adaptation_field_control,
            continuity_counter,
        })
    }

    /// Re-encode the header to its 4-byte wire form.
    ///
    /// Parsing and re-encoding reproduces the original bytes bit for bit.
    pub fn encode(&self) -> [u8; TS_HEADER_SIZE] {
        let mut bytes = [0u8; TS_HEADER_SIZE];
        bytes[0] = self.sync_byte;
        bytes[1] = ((self.transport_error_indicator as u8) << 7)
            | ((self.payload_unit_start_indicator as u8) << 6)
            | ((self.transport_priority as u8) << 5)
            | ((self.pid >> 8) as u8 & 0x1F);
        bytes[2] = (self.pid & 0xFF) as u8;
        bytes[3] = ((self.transport_scrambling_control & 0x03) << 6)
            | (self.adaptation_field_control.to_bits() << 4)
            | (self.continuity_counter & 0x0F);
        bytes
    }

    /// Check if this packet has a payload
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control.has_payload()
    }

    /// Check if this packet has an adaptation field
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control.has_adaptation_field()
    }
}
