use bytes::Bytes;
use tracing::debug;

use crate::packet::{AdaptationFieldControl, TS_HEADER_SIZE};
use crate::{Result, TsPesError};

/// PCR base clock, ticks per second.
pub const PCR_BASE_CLOCK_HZ: u64 = 90_000;

/// PCR extended clock, ticks per second.
pub const PCR_EXTENDED_CLOCK_HZ: u64 = 27_000_000;

/// Extension ticks per base tick.
pub const PCR_EXTENSION_PER_BASE: u64 = 300;

/// Program Clock Reference: 33-bit base @ 90 kHz + 9-bit extension @ 27 MHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcr {
    /// 33-bit base value at 90 kHz
    pub base: u64,
    /// 9-bit extension value at 27 MHz
    pub extension: u16,
}

impl Pcr {
    /// Parse a PCR from exactly 6 bytes.
    ///
    /// Layout: `[base32..25][base24..17][base16..9][base8..1][base0 | reserved(6) | ext_high][ext_low]`
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 6 {
            return None;
        }
        let base = ((data[0] as u64) << 25)
            | ((data[1] as u64) << 17)
            | ((data[2] as u64) << 9)
            | ((data[3] as u64) << 1)
            | ((data[4] as u64) >> 7);
        let extension = (((data[4] & 0x01) as u16) << 8) | data[5] as u16;
        Some(Pcr { base, extension })
    }

    /// Full PCR value at 27 MHz resolution.
    pub fn as_27mhz(&self) -> u64 {
        self.base * PCR_EXTENSION_PER_BASE + self.extension as u64
    }

    /// PCR as seconds (floating point).
    pub fn as_secs(&self) -> f64 {
        self.as_27mhz() as f64 / PCR_EXTENDED_CLOCK_HZ as f64
    }
}

/// Decoded adaptation field.
///
/// Sub-fields appear in wire order; each is present only when its flag bit
/// is set. Trailing stuffing bytes inside the declared length are counted
/// but never interpreted.
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    /// Declared adaptation_field_length (bytes after the length byte itself).
    pub length: u8,
    pub discontinuity_indicator: bool,
    pub random_access_indicator: bool,
    pub elementary_stream_priority_indicator: bool,
    pub pcr: Option<Pcr>,
    pub opcr: Option<Pcr>,
    pub splice_countdown: Option<i8>,
    pub transport_private_data: Option<Bytes>,
    /// Extension field, kept opaque.
    pub extension: Option<Bytes>,
    /// Trailing stuffing bytes inside the declared length.
    pub stuffing_len: usize,
}

impl AdaptationField {
    /// Parse the adaptation field of a TS packet.
    ///
    /// `packet` is the whole packet starting at the sync byte; the length
    /// byte sits at offset 4. Call only when `afc` signals a field. A
    /// declared length of 0 is legal (a lone stuffing indicator) and
    /// consumes exactly the length byte.
    pub fn parse(packet: &[u8], afc: AdaptationFieldControl) -> Result<Self> {
        debug_assert!(afc.has_adaptation_field());

        if packet.len() < TS_HEADER_SIZE + 1 {
            return Err(TsPesError::InsufficientData {
                expected: TS_HEADER_SIZE + 1,
                actual: packet.len(),
            });
        }

        let length = packet[TS_HEADER_SIZE];
        let field_start = TS_HEADER_SIZE + 1;
        let field_end = field_start + length as usize;
        if field_end > packet.len() {
            return Err(TsPesError::AdaptationFieldOverrun {
                declared: length as usize,
                available: packet.len() - field_start,
            });
        }

        // Broken muxes declare lengths inconsistent with the AFC value;
        // tolerated, the payload offset still follows the raw length byte.
        match afc {
            AdaptationFieldControl::AdaptationFieldOnly if length != 183 => {
                debug!(length, "adaptation-only packet with length != 183");
            }
            AdaptationFieldControl::AdaptationFieldAndPayload if length > 182 => {
                debug!(length, "adaptation field leaves no room for payload");
            }
            _ => {}
        }

        if length == 0 {
            return Ok(AdaptationField::default());
        }

        let data = &packet[field_start..field_end];
        let flags = data[0];
        let pcr_flag = (flags & 0x10) != 0;
        let opcr_flag = (flags & 0x08) != 0;
        let splicing_point_flag = (flags & 0x04) != 0;
        let transport_private_data_flag = (flags & 0x02) != 0;
        let extension_flag = (flags & 0x01) != 0;

        let mut offset = 1;

        let pcr = if pcr_flag {
            Pcr::parse(take(data, &mut offset, 6)?)
        } else {
            None
        };

        let opcr = if opcr_flag {
            Pcr::parse(take(data, &mut offset, 6)?)
        } else {
            None
        };

        let splice_countdown = if splicing_point_flag {
            Some(take(data, &mut offset, 1)?[0] as i8)
        } else {
            None
        };

        let transport_private_data = if transport_private_data_flag {
            let len = take(data, &mut offset, 1)?[0] as usize;
            Some(Bytes::copy_from_slice(take(data, &mut offset, len)?))
        } else {
            None
        };

        let extension = if extension_flag {
            let len = take(data, &mut offset, 1)?[0] as usize;
            Some(Bytes::copy_from_slice(take(data, &mut offset, len)?))
        } else {
            None
        };

        Ok(AdaptationField {
            length,
            discontinuity_indicator: (flags & 0x80) != 0,
            random_access_indicator: (flags & 0x40) != 0,
            elementary_stream_priority_indicator: (flags & 0x20) != 0,
            pcr,
            opcr,
            splice_countdown,
            transport_private_data,
            extension,
            stuffing_len: data.len() - offset,
        })
    }

    /// Total bytes the field occupies within the packet, length byte included.
    pub fn wire_len(&self) -> usize {
        1 + self.length as usize
    }
}

/// Advance the cursor by `n` bytes, failing when the flagged sub-field would
/// read past the declared field length.
fn take<'a>(data: &'a [u8], offset: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = *offset + n;
    if end > data.len() {
        return Err(TsPesError::AdaptationFieldOverrun {
            declared: end,
            available: data.len(),
        });
    }
    let slice = &data[*offset..end];
    *offset = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TS_PACKET_SIZE;

    fn packet_with_field(field: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
        packet[0] = 0x47;
        packet[1] = 0x00;
        packet[2] = 0x88;
        packet[3] = 0x30; // AFC = both
        packet[4] = field.len() as u8;
        packet[5..5 + field.len()].copy_from_slice(field);
        packet
    }

    #[test]
    fn test_pcr_parse_zero_and_max() {
        let pcr = Pcr::parse(&[0x00; 6]).unwrap();
        assert_eq!(pcr.base, 0);
        assert_eq!(pcr.extension, 0);
        assert_eq!(pcr.as_27mhz(), 0);

        let pcr = Pcr::parse(&[0xFF; 6]).unwrap();
        assert_eq!(pcr.base, 0x1_FFFF_FFFF);
        assert_eq!(pcr.extension, 0x1FF);
    }

    #[test]
    fn test_pcr_as_secs() {
        // 90000 base ticks = 1 second
        let pcr = Pcr {
            base: 90_000,
            extension: 0,
        };
        assert!((pcr.as_secs() - 1.0).abs() < 1e-9);
        assert_eq!(pcr.as_27mhz(), 27_000_000);
    }

    #[test]
    fn test_zero_length_field() {
        let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
        packet[0] = 0x47;
        packet[3] = 0x30;
        packet[4] = 0;
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldAndPayload)
                .unwrap();
        assert_eq!(af.length, 0);
        assert_eq!(af.wire_len(), 1);
        assert!(!af.discontinuity_indicator);
        assert!(af.pcr.is_none());
        assert_eq!(af.stuffing_len, 0);
    }

    #[test]
    fn test_flags_only_with_stuffing() {
        let packet = packet_with_field(&[0x40, 0xFF, 0xFF, 0xFF]);
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldAndPayload)
                .unwrap();
        assert!(af.random_access_indicator);
        assert!(!af.discontinuity_indicator);
        assert!(af.pcr.is_none());
        assert_eq!(af.stuffing_len, 3);
        assert_eq!(af.wire_len(), 5);
    }

    #[test]
    fn test_pcr_in_field() {
        // PCR base = 90000 (1 second), extension = 0.
        let packet = packet_with_field(&[0x10, 0x00, 0x00, 0xAF, 0xC8, 0x7E, 0x00]);
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldAndPayload)
                .unwrap();
        let pcr = af.pcr.unwrap();
        assert_eq!(pcr.base, 90_000);
        assert_eq!(pcr.extension, 0);
        assert_eq!(af.stuffing_len, 0);
    }

    #[test]
    fn test_pcr_and_opcr() {
        let mut field = vec![0x18];
        field.extend_from_slice(&[0x00, 0x00, 0xAF, 0xC8, 0x7E, 0x00]);
        field.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x80, 0x01]);
        let packet = packet_with_field(&field);
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldAndPayload)
                .unwrap();
        assert_eq!(af.pcr.unwrap().base, 90_000);
        let opcr = af.opcr.unwrap();
        assert_eq!(opcr.base, 1);
        assert_eq!(opcr.extension, 1);
    }

    #[test]
    fn test_splice_countdown_negative() {
        let packet = packet_with_field(&[0x04, 0xFE]);
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldAndPayload)
                .unwrap();
        assert_eq!(af.splice_countdown, Some(-2));
    }

    #[test]
    fn test_private_data() {
        let packet = packet_with_field(&[0x02, 0x03, 0xDE, 0xAD, 0xBE]);
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldAndPayload)
                .unwrap();
        assert_eq!(
            af.transport_private_data.as_deref(),
            Some(&[0xDE, 0xAD, 0xBE][..])
        );
    }

    #[test]
    fn test_extension_kept_opaque() {
        let packet = packet_with_field(&[0x01, 0x02, 0xCA, 0xFE, 0xFF]);
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldAndPayload)
                .unwrap();
        assert_eq!(af.extension.as_deref(), Some(&[0xCA, 0xFE][..]));
        assert_eq!(af.stuffing_len, 1);
    }

    #[test]
    fn test_flagged_subfield_overruns_declared_length() {
        // PCR flag set but only 3 of its 6 bytes fit in the declared length.
        let packet = packet_with_field(&[0x10, 0x00, 0x00, 0xAF]);
        let err = AdaptationField::parse(
            &packet,
            AdaptationFieldControl::AdaptationFieldAndPayload,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TsPesError::AdaptationFieldOverrun {
                declared: 7,
                available: 4
            }
        ));
    }

    #[test]
    fn test_declared_length_past_packet_end() {
        let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
        packet[0] = 0x47;
        packet[3] = 0x30;
        packet[4] = 0xFF; // 255 > 183 available
        let err = AdaptationField::parse(
            &packet,
            AdaptationFieldControl::AdaptationFieldAndPayload,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TsPesError::AdaptationFieldOverrun {
                declared: 255,
                available: 183
            }
        ));
    }

    #[test]
    fn test_adaptation_only_length_183() {
        let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
        packet[0] = 0x47;
        packet[3] = 0x20;
        packet[4] = 183;
        packet[5] = 0x00; // flags clear, rest stuffing
        let af =
            AdaptationField::parse(&packet, AdaptationFieldControl::AdaptationFieldOnly).unwrap();
        assert_eq!(af.length, 183);
        assert_eq!(af.stuffing_len, 182);
        assert_eq!(af.wire_len(), 184);
    }
}
