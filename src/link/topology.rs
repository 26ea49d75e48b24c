//! Link topology: local radio links, their vehicle-side parameters, and the per-send model view.

use bitflags::bitflags;
use heapless::consts::{U4, U8};
use heapless::Vec;

use crate::link::datarate::DataRate;
use crate::link::registry::{OverrideTable, Registry};
use crate::link::stats::LinkStatsView;
use crate::Error;

bitflags! {
    /// Capability flags of a vehicle radio link.
    pub struct LinkCapabilities: u32 {
        /// The link is administratively disabled.
        const DISABLED = 1 << 0;
        /// The controller may transmit on this link (it is an uplink).
        const CAN_TX = 1 << 1;
        /// The link is dedicated to relaying another vehicle; the controller must not transmit
        /// its own traffic on it.
        const USED_FOR_RELAY = 1 << 2;
        /// High-capacity link (802.11-class rather than serial).
        const HIGH_CAPACITY = 1 << 3;
    }
}

/// How the uplink data datarate of a link is derived.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UplinkDatarateMode {
    /// Use the configured uplink data rate as-is.
    Fixed,
    /// Follow the adaptive video datarate chain (see [`crate::link::datarate`]).
    SameAsAdaptiveVideo,
    /// Always use the lowest rate of the link's rate family.
    Lowest,
}

/// Per-vehicle-radio-link parameters, snapshotted from the vehicle model.
#[derive(Debug, Copy, Clone)]
pub struct VehicleLinkParams {
    pub capabilities: LinkCapabilities,
    /// The link's configured video datarate.
    pub datarate_video: DataRate,
    /// The link's configured uplink data datarate (used in [`UplinkDatarateMode::Fixed`]).
    pub uplink_datarate_data: DataRate,
    pub uplink_datarate_mode: UplinkDatarateMode,
    /// Raw radio flags forwarded to the injection driver.
    pub radio_flags: u32,
    /// Serial framing MTU; greater than zero only for serial links.
    pub sik_packet_size: u16,
}

/// A controller-side radio link: the vehicle link it matches and the interfaces assigned to it.
#[derive(Debug, Clone)]
pub struct LocalRadioLink {
    /// The peer-assigned radio link id on the vehicle.
    pub vehicle_link_id: u8,
    /// Registry indices of the interfaces assigned to this link.
    pub interfaces: Vec<u8, U8>,
    /// Snapshot of the matching vehicle link's parameters.
    pub params: VehicleLinkParams,
}

/// The set of local radio links, indexed by local link id.
pub struct Topology {
    links: Vec<LocalRadioLink, U4>,
}

impl Topology {
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Adds a local radio link; returns its local id.
    pub fn push(&mut self, link: LocalRadioLink) -> Result<usize, Error> {
        self.links.push(link).map_err(|_| Error::Capacity)?;
        Ok(self.links.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn get(&self, local_id: usize) -> Option<&LocalRadioLink> {
        self.links.get(local_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalRadioLink> {
        self.links.iter()
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

/// Datarates of the adaptive video profiles, read from the video RX side.
///
/// `user_*` describe the operator-selected profile; `received_*` describe the profile the video
/// RX is currently receiving (which the vehicle may have switched to on its own).
#[derive(Debug, Copy, Clone)]
pub struct VideoDatarates {
    pub user_profile: u8,
    /// Video datarate of the user-selected profile; unset when the profile has no rate override.
    pub user_rate: DataRate,
    /// Profile currently seen by the video RX, if any video is being received.
    pub received_profile: Option<u8>,
    /// Video datarate of the currently received profile.
    pub received_rate: DataRate,
}

impl Default for VideoDatarates {
    fn default() -> Self {
        Self {
            user_profile: 0,
            user_rate: DataRate::UNSET,
            received_profile: None,
            received_rate: DataRate::UNSET,
        }
    }
}

bitflags! {
    /// Model-level encryption configuration.
    pub struct EncryptionFlags: u8 {
        const VIDEO = 1 << 0;
        const DATA = 1 << 1;
        const ALL = 1 << 2;
    }
}

impl EncryptionFlags {
    /// Returns whether uplink data frames should carry the encryption bit.
    ///
    /// Frames are only encrypted when a passphrase is actually installed.
    pub fn encrypt_uplink(&self, has_passphrase: bool) -> bool {
        self.intersects(EncryptionFlags::DATA | EncryptionFlags::ALL) && has_passphrase
    }
}

/// Process-global flags the egress core reads on every send.
#[derive(Debug, Copy, Clone)]
pub struct GlobalFlags {
    pub encryption: EncryptionFlags,
    pub has_passphrase: bool,
    /// A firmware upload is running; uploads are single-path and keep off serial links.
    pub update_in_progress: bool,
    /// The controller→vehicle link is currently considered lost.
    pub link_to_controller_lost: bool,
    /// A malformed radio packet from an unknown source was ever received; outgoing source ids
    /// are zeroed while this is set.
    pub received_invalid_packets: bool,
}

impl Default for GlobalFlags {
    fn default() -> Self {
        Self {
            encryption: EncryptionFlags::empty(),
            has_passphrase: false,
            update_in_progress: false,
            link_to_controller_lost: false,
            received_invalid_packets: false,
        }
    }
}

/// Read-only snapshot of the model handed to the egress core per call.
///
/// Everything here is owned by other subsystems (driver probe, operator config, RX collectors);
/// the core never mutates it.
pub struct ModelView<'a> {
    pub registry: &'a Registry,
    pub overrides: &'a OverrideTable,
    pub topology: &'a Topology,
    pub stats: &'a LinkStatsView,
    pub video: &'a VideoDatarates,
    pub flags: GlobalFlags,
    /// This controller's id, stamped as the source of composed packets.
    pub controller_id: u32,
    /// The current vehicle's id.
    pub vehicle_id: u32,
}
