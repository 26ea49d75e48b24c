//! The radio driver capability consumed by the egress core.
//!
//! The stack never opens sockets or serial ports itself. Packet injection for 802.11-class
//! interfaces and byte-stream writes for serial modems are performed by an implementation of
//! [`RadioDriver`] that the application provides, typically backed by the platform's capture/
//! injection library and serial port layer. The core composes packets, decides which interface
//! and datarate to use, and hands finished frames to the driver.

use crate::link::datarate::DataRate;
use crate::Error;

/// The radio port tag carried by uplink frames from the controller to the vehicle's router.
pub const RADIO_PORT_ROUTER_UPLINK: u8 = 0x0E;

/// Result of a serial (SiK) write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SerialWrite {
    /// The driver accepted `n` payload bytes.
    Written(usize),

    /// The driver could not accept the packet right now; the packet was not sent.
    Retry,

    /// The underlying serial link is wedged and needs to be reinitialized.
    ///
    /// The caller must stop writing to this interface until the driver has reinitialized it.
    InterfaceDead,
}

/// Trait for radio packet transmission.
///
/// One implementation serves all physical interfaces; they are addressed by their stable index in
/// the [`Registry`](crate::link::registry::Registry).
pub trait RadioDriver {
    /// Configures the radio flags applied to subsequently built injection frames.
    fn set_frame_flags(&mut self, flags: u32);

    /// Configures the modulation/datarate applied to subsequently built injection frames.
    fn set_out_datarate(&mut self, rate: DataRate);

    /// Builds a raw 802.11 injection frame around `payload` into `out`.
    ///
    /// `payload` may contain multiple chained packets; the driver treats it as opaque. Returns the
    /// total frame length, or an error if `out` is too small.
    fn build_raw_frame(
        &mut self,
        local_link_id: usize,
        out: &mut [u8],
        payload: &[u8],
        port: u8,
        encrypt: bool,
    ) -> Result<usize, Error>;

    /// Writes a previously built raw frame to the given interface.
    ///
    /// Returns `false` if the kernel rejected the frame or the write came up short.
    fn write_raw_frame(&mut self, interface: usize, frame: &[u8]) -> bool;

    /// Writes one packet to a serial interface.
    ///
    /// The driver fragments the packet into its per-MTU serial framing internally.
    fn serial_send(&mut self, interface: usize, bytes: &[u8]) -> SerialWrite;

    /// Returns whether the interface is a SiK serial modem.
    fn is_sik_radio(&self, interface: usize) -> bool;

    /// Returns the on-air baudrate of a SiK interface, in bytes per second.
    fn sik_air_baudrate_bytes(&self, interface: usize) -> u32;

    /// Requests that the driver tear down and reopen a wedged SiK interface.
    ///
    /// The reinit happens outside the egress path; this only flags the interface.
    fn schedule_sik_reinit(&mut self, interface: usize);

    /// Sleeps for the given number of microseconds to honor driver pacing.
    fn sleep_micros(&mut self, micros: u32);
}
