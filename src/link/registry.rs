//! Radio interface registry: physical interfaces and per-card operator overrides.

use bitflags::bitflags;
use heapless::consts::U8;
use heapless::Vec;

use crate::link::datarate::DataRate;
use crate::Error;

/// A MAC address identifying a physical interface across reboots.
pub type Mac = [u8; 6];

enum_with_unknown! {
    /// Driver family of a physical radio interface.
    ///
    /// The family decides which TX path a packet takes and whether the datarate planner may
    /// apply the lost-link fallback (Atheros and Ralink set their rate out-of-band).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum DriverFamily(u8) {
        /// Generic 802.11 adapter driven through packet injection.
        WiFi80211 = 0,
        /// Atheros-based adapter; TX rate is configured out-of-band.
        Atheros = 1,
        /// Ralink-based adapter; TX rate is configured out-of-band.
        Ralink = 2,
        /// SiK-family serial modem with a fixed air baudrate.
        SerialSik = 3,
    }
}

impl DriverFamily {
    /// Returns whether the TX datarate of this family is configured out-of-band, making
    /// per-packet datarate adjustments (including the lost-link fallback) inapplicable.
    pub fn rate_set_out_of_band(&self) -> bool {
        matches!(self, DriverFamily::Atheros | DriverFamily::Ralink)
    }

    /// Returns whether this family is a serial byte-stream radio.
    pub fn is_serial(&self) -> bool {
        matches!(self, DriverFamily::SerialSik)
    }
}

/// A physical radio interface, created from the hardware probe at process start.
///
/// Mutated only by the driver layer; the egress core treats it as read-only.
#[derive(Debug, Copy, Clone)]
pub struct RadioInterface {
    pub mac: Mac,
    pub family: DriverFamily,
    pub tx_capable: bool,
    pub opened_for_write: bool,
    pub frequency_khz: u32,
}

bitflags! {
    /// Per-card capability override flags, controlled by the operator.
    pub struct CardCapabilities: u32 {
        /// The card must not be used at all.
        const DISABLED = 1 << 0;
        /// The card may transmit.
        const CAN_TX = 1 << 1;
        /// The card may receive.
        const CAN_RX = 1 << 2;
        /// The card may carry data (as opposed to eg. a dedicated relay card).
        const CAN_USE_FOR_DATA = 1 << 3;
    }
}

/// Operator-controlled per-card configuration, persisted externally and keyed by MAC.
#[derive(Debug, Copy, Clone)]
pub struct InterfaceOverrides {
    pub capabilities: CardCapabilities,
    /// Preferred-TX rank; 0 means no preference, lower positive values win.
    pub preferred_tx_rank: u8,
    /// Per-card datarate cap; [`DataRate::UNSET`] inherits the link datarate.
    pub datarate_override: DataRate,
}

impl Default for InterfaceOverrides {
    fn default() -> Self {
        Self {
            capabilities: CardCapabilities::CAN_TX
                | CardCapabilities::CAN_RX
                | CardCapabilities::CAN_USE_FOR_DATA,
            preferred_tx_rank: 0,
            datarate_override: DataRate::UNSET,
        }
    }
}

/// Lookup table of per-card overrides.
pub struct OverrideTable {
    entries: Vec<(Mac, InterfaceOverrides), U8>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Stores the overrides for `mac`, replacing any previous entry.
    pub fn set(&mut self, mac: Mac, overrides: InterfaceOverrides) -> Result<(), Error> {
        for entry in self.entries.iter_mut() {
            if entry.0 == mac {
                entry.1 = overrides;
                return Ok(());
            }
        }
        self.entries
            .push((mac, overrides))
            .map_err(|_| Error::Capacity)
    }

    /// Returns the overrides for `mac`, or the defaults if the operator never touched this card.
    pub fn get(&self, mac: &Mac) -> InterfaceOverrides {
        self.entries
            .iter()
            .find(|(m, _)| m == mac)
            .map(|(_, o)| *o)
            .unwrap_or_default()
    }
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The set of physical radio interfaces, indexed by their stable probe order.
pub struct Registry {
    interfaces: Vec<RadioInterface, U8>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            interfaces: Vec::new(),
        }
    }

    /// Registers an interface; returns its stable index.
    pub fn push(&mut self, interface: RadioInterface) -> Result<usize, Error> {
        self.interfaces
            .push(interface)
            .map_err(|_| Error::Capacity)?;
        Ok(self.interfaces.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RadioInterface> {
        self.interfaces.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RadioInterface> {
        self.interfaces.iter()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
