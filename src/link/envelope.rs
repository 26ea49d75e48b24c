//! Envelope sequencing: per-stream and per-link packet indices.
//!
//! Stream sequence numbers are assigned once per send buffer, before link fan-out, so every copy
//! of a packet carries the same stream sequence regardless of how many links transmit it. The
//! radio-link packet index is the opposite: it counts *physical transmissions* per local link and
//! is assigned (together with the checksum) immediately before each transmission.

use crate::link::packet::{self, PacketHeader};
use crate::link::{MAX_RADIO_LINKS, MAX_RADIO_STREAMS};
use crate::Error;

/// Owns the per-stream and per-link monotonic counters.
pub struct Sequencer {
    stream_tx_index: [u32; MAX_RADIO_STREAMS],
    link_packet_index: [u16; MAX_RADIO_LINKS],
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            stream_tx_index: [0; MAX_RADIO_STREAMS],
            link_packet_index: [0; MAX_RADIO_LINKS],
        }
    }

    /// Stamps the per-stream sequence number into `header`.
    ///
    /// Ping and ping-reply packets carry their own correlation id and do not consume a sequence
    /// number; they are re-stamped with the current counter value without advancing it. When
    /// `zero_src` is set the source vehicle id is cleared (privacy fallback after receiving
    /// malformed traffic from unknown sources).
    pub fn stamp_stream(&mut self, header: &mut PacketHeader, zero_src: bool) {
        let stream = usize::from(header.stream_id()) % MAX_RADIO_STREAMS;
        if !header.is_ping() {
            self.stream_tx_index[stream] = self.stream_tx_index[stream].wrapping_add(1);
        }
        header.set_stream_sequence(self.stream_tx_index[stream]);
        if zero_src {
            header.vehicle_id_src = 0;
        }
    }

    /// Returns the next radio-link packet index for `local_link_id`.
    pub fn next_link_packet_index(&mut self, local_link_id: usize) -> u16 {
        let slot = local_link_id % MAX_RADIO_LINKS;
        self.link_packet_index[slot] = self.link_packet_index[slot].wrapping_add(1);
        self.link_packet_index[slot]
    }

    /// Stamps link packet indices and checksums into every sub-packet of `buffer`, for a
    /// transmission on `local_link_id`.
    ///
    /// Used by the WiFi path, which transmits the whole chain in one frame. The serial path
    /// stamps per sub-packet instead, since admission may drop individual chain members.
    pub fn stamp_link(&mut self, buffer: &mut [u8], local_link_id: usize) -> Result<(), Error> {
        let mut offset = 0;
        while offset < buffer.len() {
            let index = self.next_link_packet_index(local_link_id);
            let header = match packet::header_mut(buffer, offset) {
                Some(h) => h,
                None => return Err(Error::InvalidLength),
            };
            header.radio_link_packet_index = index;
            let len = usize::from(header.total_length);
            packet::stamp_checksum(buffer, offset)?;
            if len == 0 {
                return Err(Error::InvalidLength);
            }
            offset += len;
        }
        Ok(())
    }

    /// Current sequence number of a stream (last assigned).
    pub fn stream_index(&self, stream: usize) -> u32 {
        self.stream_tx_index[stream % MAX_RADIO_STREAMS]
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::packet::{sub_packets, verify_checksum, Module, PacketType};
    use crate::testutil::make_packet;

    #[test]
    fn streams_advance_independently() {
        let mut seq = Sequencer::new();
        let mut a = make_packet(PacketType::Command, Module::Commands, 0, 0);
        let mut b = make_packet(PacketType::TelemetryRaw, Module::Telemetry, 2, 0);

        for expected in 1..=3u32 {
            let header = packet::header_mut(&mut a, 0).unwrap();
            seq.stamp_stream(header, false);
            assert_eq!(header.stream_sequence(), expected);
        }
        let header = packet::header_mut(&mut b, 0).unwrap();
        seq.stamp_stream(header, false);
        assert_eq!(header.stream_sequence(), 1);
        assert_eq!(header.stream_id(), 2);
    }

    #[test]
    fn pings_do_not_consume_sequence_numbers() {
        let mut seq = Sequencer::new();
        let mut data = make_packet(PacketType::Command, Module::Commands, 0, 0);
        let mut ping = make_packet(PacketType::Ping, Module::Control, 0, 2);
        let mut reply = make_packet(PacketType::PingReply, Module::Control, 0, 2);

        seq.stamp_stream(packet::header_mut(&mut data, 0).unwrap(), false);
        seq.stamp_stream(packet::header_mut(&mut ping, 0).unwrap(), false);
        seq.stamp_stream(packet::header_mut(&mut reply, 0).unwrap(), false);
        assert_eq!(seq.stream_index(0), 1);

        seq.stamp_stream(packet::header_mut(&mut data, 0).unwrap(), false);
        assert_eq!(
            packet::header_mut(&mut data, 0).unwrap().stream_sequence(),
            2
        );
    }

    #[test]
    fn zeroes_source_id_on_request() {
        let mut seq = Sequencer::new();
        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 0);
        packet::header_mut(&mut buf, 0).unwrap().vehicle_id_src = 77;
        seq.stamp_stream(packet::header_mut(&mut buf, 0).unwrap(), true);
        assert_eq!({ packet::header_mut(&mut buf, 0).unwrap().vehicle_id_src }, 0);
    }

    #[test]
    fn stamp_link_covers_every_chain_member() {
        let mut seq = Sequencer::new();
        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 6);
        buf.extend_from_slice(&make_packet(PacketType::TelemetryRaw, Module::Telemetry, 2, 3));

        seq.stamp_link(&mut buf, 1).unwrap();
        let headers: std::vec::Vec<_> = sub_packets(&buf).collect();
        assert_eq!({ headers[0].1.radio_link_packet_index }, 1);
        assert_eq!({ headers[1].1.radio_link_packet_index }, 2);
        assert!(verify_checksum(&buf, headers[0].0));
        assert!(verify_checksum(&buf, headers[1].0));

        // A second transmission on another link counts independently.
        seq.stamp_link(&mut buf, 0).unwrap();
        let headers: std::vec::Vec<_> = sub_packets(&buf).collect();
        assert_eq!({ headers[0].1.radio_link_packet_index }, 1);
        assert_eq!({ headers[1].1.radio_link_packet_index }, 2);
    }
}
