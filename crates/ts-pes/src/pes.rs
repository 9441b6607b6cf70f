use tracing::warn;

use crate::{Result, TsPesError};

/// PTS/DTS clock, ticks per second.
pub const TIMESTAMP_CLOCK_HZ: u64 = 90_000;

/// Fixed PES header bytes: start code prefix + stream_id + packet length.
pub const PES_FIXED_HEADER_SIZE: usize = 6;

/// PES stream_id, classified per ISO 13818-1 Table 2-18.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    /// 0xBC
    ProgramStreamMap,
    /// 0xBD
    PrivateStream1,
    /// 0xBE
    PaddingStream,
    /// 0xBF
    PrivateStream2,
    /// 0xC0..=0xDF
    Audio(u8),
    /// 0xE0..=0xEF
    Video(u8),
    /// 0xF0
    Ecm,
    /// 0xF1
    Emm,
    /// 0xF2
    Dsmcc,
    /// 0xF8, ITU-T Rec. H.222.1 type E
    H222TypeE,
    /// 0xFF
    ProgramStreamDirectory,
    /// Anything else
    Other(u8),
}

impl From<u8> for StreamId {
    fn from(id: u8) -> Self {
        match id {
            0xBC => StreamId::ProgramStreamMap,
            0xBD => StreamId::PrivateStream1,
            0xBE => StreamId::PaddingStream,
            0xBF => StreamId::PrivateStream2,
            0xC0..=0xDF => StreamId::Audio(id),
            0xE0..=0xEF => StreamId::Video(id),
            0xF0 => StreamId::Ecm,
            0xF1 => StreamId::Emm,
            0xF2 => StreamId::Dsmcc,
            0xF8 => StreamId::H222TypeE,
            0xFF => StreamId::ProgramStreamDirectory,
            other => StreamId::Other(other),
        }
    }
}

impl StreamId {
    /// Raw wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            StreamId::ProgramStreamMap => 0xBC,
            StreamId::PrivateStream1 => 0xBD,
            StreamId::PaddingStream => 0xBE,
            StreamId::PrivateStream2 => 0xBF,
            StreamId::Audio(id) | StreamId::Video(id) | StreamId::Other(id) => id,
            StreamId::Ecm => 0xF0,
            StreamId::Emm => 0xF1,
            StreamId::Dsmcc => 0xF2,
            StreamId::H222TypeE => 0xF8,
            StreamId::ProgramStreamDirectory => 0xFF,
        }
    }

    /// Whether packets of this stream carry the optional PES header
    /// (flags, PES_header_data_length, PTS/DTS and friends).
    pub fn has_optional_header(self) -> bool {
        !matches!(
            self,
            StreamId::ProgramStreamMap
                | StreamId::PaddingStream
                | StreamId::PrivateStream2
                | StreamId::Ecm
                | StreamId::Emm
                | StreamId::Dsmcc
                | StreamId::H222TypeE
                | StreamId::ProgramStreamDirectory
        )
    }

    pub fn is_audio(self) -> bool {
        matches!(self, StreamId::Audio(_))
    }

    pub fn is_video(self) -> bool {
        matches!(self, StreamId::Video(_))
    }
}

/// Parse a 33-bit PTS or DTS timestamp from 5 bytes.
///
/// Layout: `[marker(4) | ts32..30 | 1 | ts29..15 | 1 | ts14..0 | 1]`
fn parse_timestamp(data: &[u8]) -> Option<u64> {
    if data.len() < 5 {
        return None;
    }
    let ts = (((data[0] as u64 >> 1) & 0x07) << 30)
        | ((data[1] as u64) << 22)
        | (((data[2] as u64 >> 1) & 0x7F) << 15)
        | ((data[3] as u64) << 7)
        | ((data[4] as u64 >> 1) & 0x7F);
    Some(ts)
}

/// Decoded PES packet header.
///
/// One instance per PES unit; the assembler keeps it until the unit
/// completes.
#[derive(Debug, Clone)]
pub struct PesHeader {
    pub stream_id: StreamId,
    /// Bytes following the length field; 0 means unbounded.
    pub pes_packet_length: u16,
    pub data_alignment_indicator: bool,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub pes_header_data_length: u8,
    /// Bytes from the start of the PES packet to the first payload byte.
    pub header_len: usize,
}

impl PesHeader {
    /// Parse a PES header from a slice starting at the packet's first byte.
    ///
    /// Stream ids without an optional header have no
    /// PES_header_data_length byte at all; their payload starts right
    /// after the length field.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err(TsPesError::InsufficientData {
                expected: PES_FIXED_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
            let word = ((data[0] as u32) << 24)
                | ((data[1] as u32) << 16)
                | ((data[2] as u32) << 8)
                | data[3] as u32;
            return Err(TsPesError::InvalidStartCodePrefix(word));
        }

        let stream_id = StreamId::from(data[3]);
        let pes_packet_length = ((data[4] as u16) << 8) | data[5] as u16;

        if !stream_id.has_optional_header() {
            return Ok(PesHeader {
                stream_id,
                pes_packet_length,
                data_alignment_indicator: false,
                pts: None,
                dts: None,
                pes_header_data_length: 0,
                header_len: PES_FIXED_HEADER_SIZE,
            });
        }

        if data.len() < 9 {
            return Err(TsPesError::InsufficientData {
                expected: 9,
                actual: data.len(),
            });
        }

        let data_alignment_indicator = (data[6] & 0x04) != 0;
        let pts_dts_flags = (data[7] >> 6) & 0x03;
        let pes_header_data_length = data[8];

        let (pts, dts) = match pts_dts_flags {
            0b10 => {
                if data.len() < 14 {
                    return Err(TsPesError::InsufficientData {
                        expected: 14,
                        actual: data.len(),
                    });
                }
                (parse_timestamp(&data[9..14]), None)
            }
            0b11 => {
                if data.len() < 19 {
                    return Err(TsPesError::InsufficientData {
                        expected: 19,
                        actual: data.len(),
                    });
                }
                (
                    parse_timestamp(&data[9..14]),
                    parse_timestamp(&data[14..19]),
                )
            }
            0b01 => {
                // Forbidden by the standard; no timestamps can follow.
                warn!(
                    stream_id = stream_id.as_u8(),
                    "forbidden PTS_DTS_flags value 0b01, ignoring"
                );
                (None, None)
            }
            _ => (None, None),
        };

        Ok(PesHeader {
            stream_id,
            pes_packet_length,
            data_alignment_indicator,
            pts,
            dts,
            pes_header_data_length,
            header_len: 9 + pes_header_data_length as usize,
        })
    }

    /// Elementary-stream byte count promised by the header.
    ///
    /// `PES_packet_length` counts everything after the length field: for
    /// optional-header streams that is 3 fixed bytes, the optional fields,
    /// then the payload. `None` when the length is unbounded (0) or the
    /// header is internally inconsistent (the subtraction underflows).
    pub fn declared_payload_len(&self) -> Option<usize> {
        if self.pes_packet_length == 0 {
            return None;
        }
        let total = self.pes_packet_length as usize;
        if self.stream_id.has_optional_header() {
            total.checked_sub(3 + self.pes_header_data_length as usize)
        } else {
            Some(total)
        }
    }

    /// Convert PTS to seconds.
    pub fn pts_secs(&self) -> Option<f64> {
        self.pts.map(|pts| pts as f64 / TIMESTAMP_CLOCK_HZ as f64)
    }

    /// Convert DTS to seconds.
    pub fn dts_secs(&self) -> Option<f64> {
        self.dts.map(|dts| dts as f64 / TIMESTAMP_CLOCK_HZ as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_timestamp(marker: u8, ts: u64) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0] = (marker << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 0x01;
        bytes[1] = (ts >> 22) as u8;
        bytes[2] = ((ts >> 15) as u8 & 0x7F) << 1 | 0x01;
        bytes[3] = (ts >> 7) as u8;
        bytes[4] = ((ts as u8) & 0x7F) << 1 | 0x01;
        bytes
    }

    fn make_pes_with_pts(stream_id: u8, length: u16, pts: u64) -> Vec<u8> {
        let mut data = vec![
            0x00,
            0x00,
            0x01, // start code
            stream_id,
            (length >> 8) as u8,
            (length & 0xFF) as u8,
            0x80, // marker bits
            0x80, // PTS only
            0x05, // pes_header_data_length
        ];
        data.extend_from_slice(&encode_timestamp(0x2, pts));
        data
    }

    #[test]
    fn test_stream_id_classification() {
        assert!(StreamId::from(0xE0).is_video());
        assert!(StreamId::from(0xC0).is_audio());
        assert!(StreamId::from(0xE0).has_optional_header());
        assert!(StreamId::from(0xBD).has_optional_header());
        for id in [0xBCu8, 0xBE, 0xBF, 0xF0, 0xF1, 0xF2, 0xF8, 0xFF] {
            assert!(
                !StreamId::from(id).has_optional_header(),
                "{id:#04x} must have no optional header"
            );
            assert_eq!(StreamId::from(id).as_u8(), id);
        }
        assert_eq!(StreamId::from(0xE7).as_u8(), 0xE7);
        assert_eq!(StreamId::from(0xA0), StreamId::Other(0xA0));
    }

    #[test]
    fn test_parse_pts_only() {
        let data = make_pes_with_pts(0xE0, 100, 90_000);
        let header = PesHeader::parse(&data).unwrap();
        assert!(header.stream_id.is_video());
        assert_eq!(header.pes_packet_length, 100);
        assert_eq!(header.pts, Some(90_000));
        assert!(header.dts.is_none());
        assert_eq!(header.pes_header_data_length, 5);
        assert_eq!(header.header_len, 14);
        assert!((header.pts_secs().unwrap() - 1.0).abs() < 1e-9);
        // 100 - 3 - 5
        assert_eq!(header.declared_payload_len(), Some(92));
    }

    #[test]
    fn test_parse_pts_dts() {
        let mut data = vec![
            0x00, 0x00, 0x01, 0xE0, 0x00, 0x20, // length = 32
            0x84, // data_alignment_indicator set
            0xC0, // PTS + DTS
            0x0A,
        ];
        data.extend_from_slice(&encode_timestamp(0x3, 180_000));
        data.extend_from_slice(&encode_timestamp(0x1, 90_000));
        let header = PesHeader::parse(&data).unwrap();
        assert!(header.data_alignment_indicator);
        assert_eq!(header.pts, Some(180_000));
        assert_eq!(header.dts, Some(90_000));
        assert_eq!(header.header_len, 19);
        assert_eq!(header.declared_payload_len(), Some(32 - 3 - 10));
    }

    #[test]
    fn test_parse_max_and_zero_pts() {
        let header =
            PesHeader::parse(&make_pes_with_pts(0xE0, 0x10, 0x1_FFFF_FFFF)).unwrap();
        assert_eq!(header.pts, Some(0x1_FFFF_FFFF));
        let header = PesHeader::parse(&make_pes_with_pts(0xE0, 0x10, 0)).unwrap();
        assert_eq!(header.pts, Some(0));
    }

    #[test]
    fn test_no_optional_header_stream() {
        let data = vec![0x00, 0x00, 0x01, 0xBE, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFF];
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.stream_id, StreamId::PaddingStream);
        assert_eq!(header.header_len, 6);
        assert!(header.pts.is_none());
        // Every byte after the length field is payload.
        assert_eq!(header.declared_payload_len(), Some(4));
    }

    #[test]
    fn test_invalid_start_code() {
        let data = vec![0x00, 0x00, 0x02, 0xE0, 0x00, 0x00];
        assert!(matches!(
            PesHeader::parse(&data),
            Err(TsPesError::InvalidStartCodePrefix(0x000002E0))
        ));
    }

    #[test]
    fn test_short_data() {
        assert!(matches!(
            PesHeader::parse(&[0x00, 0x00, 0x01, 0xE0]),
            Err(TsPesError::InsufficientData {
                expected: 6,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_forbidden_pts_dts_flags_ignored() {
        let data = vec![
            0x00, 0x00, 0x01, 0xE0, 0x00, 0x10, // length = 16
            0x80, 0x40, // flags = 0b01 (forbidden)
            0x00,
        ];
        let header = PesHeader::parse(&data).unwrap();
        assert!(header.pts.is_none());
        assert!(header.dts.is_none());
        assert_eq!(header.header_len, 9);
    }

    #[test]
    fn test_unbounded_length() {
        let data = make_pes_with_pts(0xE0, 0, 90_000);
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.pes_packet_length, 0);
        assert_eq!(header.declared_payload_len(), None);
    }

    #[test]
    fn test_inconsistent_lengths_underflow() {
        // length = 4 but the optional header alone occupies 3 + 5 bytes.
        let data = make_pes_with_pts(0xE0, 4, 0);
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.declared_payload_len(), None);
    }
}
