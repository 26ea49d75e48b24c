//! Radio envelope structures.

use byteorder::{ByteOrder, LittleEndian};
use core::fmt;
use core::mem;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned};

use crate::crc::crc32;
use crate::Error;

/// Number of bits the stream id occupies at the top of `stream_packet_idx`.
pub const STREAM_INDEX_SHIFT: u32 = 28;

/// Mask of the per-stream sequence number in `stream_packet_idx`.
pub const STREAM_SEQUENCE_MASK: u32 = 0x0FFF_FFFF;

/// Module tag mask in the packet flags octet.
pub const PACKET_FLAGS_MASK_MODULE: u8 = 0x0F;

/// When set, the envelope checksum covers only the header instead of the whole packet.
pub const PACKET_FLAGS_BIT_HEADERS_ONLY_CRC: u8 = 1 << 4;

enum_with_unknown! {
    /// Specially recognized packet types.
    ///
    /// The egress path only inspects these; all other values pass through untouched.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum PacketType(u8) {
        /// Command request towards the vehicle. A [`CommandHeader`] follows the envelope.
        Command = 0x05,
        /// Clock ping. Carries its own correlation id and does not consume a stream sequence
        /// number.
        Ping = 0x0A,
        /// Reply to a [`PacketType::Ping`]. Also exempt from stream sequencing.
        PingReply = 0x0B,
        /// Remote SiK radio configuration command.
        SikConfig = 0x0C,
        /// Firmware upload block (see [`crate::upload`]).
        UploadSoftware = 0x0D,
        /// Radio link test packet; pins the send to the link id in its first payload byte.
        TestLink = 0x0E,
        /// Raw telemetry uplink.
        TelemetryRaw = 0x0F,
    }
}

enum_with_unknown! {
    /// Module tag in the low nibble of the packet flags.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum Module(u8) {
        Control = 0,
        Commands = 1,
        Telemetry = 2,
        Video = 3,
        Audio = 4,
    }
}

/// The radio envelope preceding every application packet.
///
/// See the [module docs](crate::link) for the wire layout. This struct maps the on-air bytes
/// directly; use the accessor methods instead of poking at the packed fields.
#[derive(Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct PacketHeader {
    /// Envelope checksum; coverage depends on `HEADERS_ONLY_CRC`.
    pub crc: u32,
    /// Module tag and flag bits.
    pub packet_flags: u8,
    /// Domain packet type (see [`PacketType`]).
    pub packet_type: u8,
    /// Packed stream id and per-stream sequence number.
    pub stream_packet_idx: u32,
    /// Monotonic per-local-link transmission counter, wrap-allowed.
    pub radio_link_packet_index: u16,
    /// Total packet length, header included.
    pub total_length: u16,
    /// Sender vehicle/controller id.
    pub vehicle_id_src: u32,
    /// Destination vehicle id.
    pub vehicle_id_dest: u32,
}

impl PacketHeader {
    /// Returns the recognized packet type.
    pub fn kind(&self) -> PacketType {
        PacketType::from(self.packet_type)
    }

    /// Returns the module tag from the flags octet.
    pub fn module(&self) -> Module {
        Module::from(self.packet_flags & PACKET_FLAGS_MASK_MODULE)
    }

    /// Returns whether the checksum covers only the header.
    pub fn headers_only_crc(&self) -> bool {
        self.packet_flags & PACKET_FLAGS_BIT_HEADERS_ONLY_CRC != 0
    }

    /// Extracts the 4-bit stream id.
    pub fn stream_id(&self) -> u8 {
        (self.stream_packet_idx >> STREAM_INDEX_SHIFT) as u8
    }

    /// Extracts the 28-bit per-stream sequence number.
    pub fn stream_sequence(&self) -> u32 {
        self.stream_packet_idx & STREAM_SEQUENCE_MASK
    }

    /// Re-packs `stream_packet_idx` from the current stream id and the given sequence number.
    pub fn set_stream_sequence(&mut self, sequence: u32) {
        let stream = u32::from(self.stream_id());
        self.stream_packet_idx = (stream << STREAM_INDEX_SHIFT) | (sequence & STREAM_SEQUENCE_MASK);
    }

    /// Returns whether this packet is exempt from stream sequencing.
    pub fn is_ping(&self) -> bool {
        matches!(self.kind(), PacketType::Ping | PacketType::PingReply)
    }
}

impl fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Copy out of the packed struct before formatting.
        let (link_idx, len) = (self.radio_link_packet_index, self.total_length);
        f.debug_struct("PacketHeader")
            .field("type", &self.kind())
            .field("module", &self.module())
            .field("stream", &self.stream_id())
            .field("seq", &self.stream_sequence())
            .field("link_idx", &link_idx)
            .field("len", &len)
            .finish()
    }
}

/// Command sub-header following the envelope on [`PacketType::Command`] packets.
#[derive(Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct CommandHeader {
    /// Command id.
    pub command_type: u8,
    /// Monotonic command counter, used to correlate responses.
    pub command_counter: u32,
    /// Retry number of this command request, 0 for the first send.
    pub resend_counter: u8,
}

/// Fixed framing header prepended to each serial MTU fragment by the driver.
///
/// The fragmentation itself is driver-internal; the egress core only accounts for this header's
/// size when metering serial airtime.
#[derive(Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct ShortHeader {
    pub start_marker: u8,
    pub crc: u8,
    pub data_length: u8,
    pub packet_index: u8,
    pub last_received_index: u8,
    pub reserved: u8,
}

/// Iterator over the chained sub-packets in a send buffer.
///
/// Yields `(offset, header)` pairs. Iteration stops at the first malformed length field; the
/// remainder of the buffer is not trusted past that point.
pub struct SubPackets<'a> {
    buf: &'a [u8],
    offset: usize,
}

/// Walks the chained `(header, payload)` sub-packets in `buf`.
pub fn sub_packets(buf: &[u8]) -> SubPackets<'_> {
    SubPackets { buf, offset: 0 }
}

impl<'a> Iterator for SubPackets<'a> {
    type Item = (usize, PacketHeader);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.offset..];
        let (header, _): (LayoutVerified<&[u8], PacketHeader>, _) =
            LayoutVerified::new_unaligned_from_prefix(rest)?;
        let header = *header;
        let len = usize::from(header.total_length);
        if len < mem::size_of::<PacketHeader>() || len > rest.len() {
            return None;
        }
        let offset = self.offset;
        self.offset += len;
        Some((offset, header))
    }
}

/// Returns a mutable view of the packet header at `offset` in `buf`.
pub fn header_mut(buf: &mut [u8], offset: usize) -> Option<&mut PacketHeader> {
    let rest = buf.get_mut(offset..)?;
    let (header, _): (LayoutVerified<&mut [u8], PacketHeader>, _) =
        LayoutVerified::new_unaligned_from_prefix(rest)?;
    Some(header.into_mut())
}

/// Computes and stores the envelope checksum of the sub-packet starting at `offset`.
///
/// Coverage starts right after the CRC field and extends over the header only when
/// `HEADERS_ONLY_CRC` is set, over the whole packet otherwise.
pub fn stamp_checksum(buf: &mut [u8], offset: usize) -> Result<(), Error> {
    let packet = buf.get_mut(offset..).ok_or(Error::InvalidLength)?;
    let (header, _): (LayoutVerified<&[u8], PacketHeader>, _) =
        LayoutVerified::new_unaligned_from_prefix(&*packet).ok_or(Error::InvalidLength)?;
    let cover = if header.headers_only_crc() {
        mem::size_of::<PacketHeader>()
    } else {
        usize::from(header.total_length)
    };
    if cover < mem::size_of::<PacketHeader>() || cover > packet.len() {
        return Err(Error::InvalidLength);
    }
    let crc = crc32(&packet[4..cover]);
    LittleEndian::write_u32(&mut packet[..4], crc);
    Ok(())
}

/// Verifies the envelope checksum of the sub-packet starting at `offset`.
pub fn verify_checksum(buf: &[u8], offset: usize) -> bool {
    let packet = match buf.get(offset..) {
        Some(p) => p,
        None => return false,
    };
    let header: LayoutVerified<&[u8], PacketHeader> =
        match LayoutVerified::new_unaligned_from_prefix(packet) {
            Some((h, _)) => h,
            None => return false,
        };
    let cover = if header.headers_only_crc() {
        mem::size_of::<PacketHeader>()
    } else {
        usize::from(header.total_length)
    };
    if cover < mem::size_of::<PacketHeader>() || cover > packet.len() {
        return false;
    }
    crc32(&packet[4..cover]) == LittleEndian::read_u32(&packet[..4])
}
