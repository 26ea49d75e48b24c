//! Radio link egress core.
//!
//! This module is a construction kit for the controller's uplink path: it decides which physical
//! interface carries each outbound packet, at what modulation/datarate, wraps the packet into the
//! radio envelope, paces bandwidth-constrained serial modems, and keeps the per-stream and
//! per-link packet accounting.
//!
//! # Packet Format
//!
//! Every application packet is preceded by the radio envelope header. All fields are transmitted
//! in little-endian byte order.
//!
//! ```notrust
//! LSB                                                                                     MSB
//! +-------+---------+--------+--------------+------------+---------+----------+-----------+
//! |  CRC  |  Flags  |  Type  |  Stream/Seq  |  Link Idx  | Length  |  Src Id  |  Dest Id  |
//! |  (4)  |   (1)   |  (1)   |     (4)      |    (2)     |   (2)   |   (4)    |    (4)    |
//! +-------+---------+--------+--------------+------------+---------+----------+-----------+
//! ```
//!
//! The `Flags` octet carries the module tag in its low nibble and flag bits above it. The
//! `Stream/Seq` word packs a 4-bit stream id and a 28-bit per-stream sequence number. `Link Idx`
//! is a per-local-radio-link monotonic counter, assigned once per physical transmission.
//!
//! The `CRC` covers either the rest of the header (when `HEADERS_ONLY_CRC` is set) or the rest of
//! the whole packet, starting right after the CRC field itself.
//!
//! A send buffer may contain *several* such packets back to back ("chained" packets); the egress
//! dispatcher walks the chain using each packet's `Length` field.

pub mod datarate;
pub mod egress;
pub mod envelope;
pub mod packet;
pub mod pacer;
pub mod registry;
pub mod selector;
pub mod stats;
pub mod topology;

pub use self::egress::{Egress, LinkHint, SendOutcome};
pub use self::selector::{TxMap, TxSelector};

/// Maximum number of radio streams; the stream id is a 4-bit field.
pub const MAX_RADIO_STREAMS: usize = 16;

/// Maximum number of physical radio interfaces on a controller.
pub const MAX_RADIO_INTERFACES: usize = 8;

/// Maximum number of local radio links.
pub const MAX_RADIO_LINKS: usize = 4;

/// Largest composed packet (chained sub-packets included) the egress path will carry, and the
/// size of the raw-frame scratch buffer.
pub const MAX_PACKET_TOTAL_SIZE: usize = 1600;

/// Percentage of a serial interface's air baudrate that uplink traffic may consume.
pub const DEFAULT_RADIO_SERIAL_MAX_TX_LOAD: u32 = 80;
