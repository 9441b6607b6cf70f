use bytes::{Buf, Bytes};
use memchr::memchr;
use tracing::debug;
use ts_pes::{SYNC_BYTE, TS_PACKET_SIZE};

/// Iterates 188-byte packets out of a raw byte buffer.
///
/// Alignment is the supplier's job: when a frame boundary does not carry
/// the sync byte, the source scans forward for the next 0x47 that also has
/// 0x47 one packet later, counting the bytes it skipped.
pub struct PacketSource {
    data: Bytes,
    skipped: u64,
}

impl PacketSource {
    pub fn new(data: Bytes) -> Self {
        PacketSource { data, skipped: 0 }
    }

    /// Bytes discarded during resynchronization.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }
}

impl Iterator for PacketSource {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        loop {
            if self.data.len() < TS_PACKET_SIZE {
                return None;
            }

            if self.data[0] == SYNC_BYTE {
                let packet = self.data.slice(..TS_PACKET_SIZE);
                self.data.advance(TS_PACKET_SIZE);
                return Some(packet);
            }

            let Some(pos) = memchr(SYNC_BYTE, &self.data) else {
                self.skipped += self.data.len() as u64;
                debug!(skipped = self.skipped, "no sync byte in remaining data");
                self.data.advance(self.data.len());
                return None;
            };

            // Require the next frame boundary to sync too, when there is
            // enough data to check; a lone 0x47 in garbage is not a packet.
            let check = pos + TS_PACKET_SIZE;
            if check < self.data.len() && self.data[check] != SYNC_BYTE {
                self.skipped += (pos + 1) as u64;
                self.data.advance(pos + 1);
                continue;
            }

            debug!(skipped = pos, "resynchronized to sync byte");
            self.skipped += pos as u64;
            self.data.advance(pos);
        }
    }
}
