//! Uplink datarate planning.
//!
//! Datarates use a signed convention inherited from the wire protocol: positive values are legacy
//! rates in bits per second, negative values are MCS indices (−1 = MCS0, −2 = MCS1, …), and zero
//! means "unset / inherit". Comparing two rates always goes through [`DataRate::bits_per_sec`] so
//! that "lower" consistently means slower on air.

use core::fmt;

use crate::link::registry::{InterfaceOverrides, RadioInterface};
use crate::link::topology::{UplinkDatarateMode, VehicleLinkParams, VideoDatarates};

/// Positive-rate floor used by fallbacks and by [`step_down`].
pub const DEFAULT_RADIO_DATARATE_LOWEST: i32 = 6_000_000;

/// Legacy (non-MCS) rates the radios support, ascending, in bps.
pub const LEGACY_RATES_BPS: [i32; 11] = [
    1_000_000, 2_000_000, 6_000_000, 9_000_000, 11_000_000, 12_000_000, 18_000_000, 24_000_000,
    36_000_000, 48_000_000, 54_000_000,
];

/// Effective on-air rates of MCS indices 0.., in bps (20 MHz, long GI).
const MCS_RATES_BPS: [u32; 8] = [
    6_500_000, 13_000_000, 19_500_000, 26_000_000, 39_000_000, 52_000_000, 58_500_000, 65_000_000,
];

/// An uplink modulation/datarate in the signed wire convention.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DataRate(i32);

impl DataRate {
    /// No rate configured; inherit from the surrounding context.
    pub const UNSET: Self = DataRate(0);

    /// MCS index 0, the slowest MCS rate.
    pub const MCS0: Self = DataRate(-1);

    /// The positive-rate floor, [`DEFAULT_RADIO_DATARATE_LOWEST`].
    pub const LOWEST: Self = DataRate(DEFAULT_RADIO_DATARATE_LOWEST);

    /// Creates a rate from its raw signed wire value.
    pub fn from_raw(raw: i32) -> Self {
        DataRate(raw)
    }

    /// Creates a legacy rate of `bps` bits per second.
    pub fn from_bps(bps: u32) -> Self {
        DataRate(bps as i32)
    }

    /// Creates an MCS rate from an MCS index.
    pub fn mcs(index: u8) -> Self {
        DataRate(-(i32::from(index) + 1))
    }

    /// Returns the raw signed wire value.
    pub fn raw(&self) -> i32 {
        self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    pub fn is_mcs(&self) -> bool {
        self.0 < 0
    }

    /// Converts either representation to effective bits per second for comparisons.
    ///
    /// Unset rates convert to 0. MCS indices beyond the table extrapolate from the last entry.
    pub fn bits_per_sec(&self) -> u32 {
        if self.0 >= 0 {
            self.0 as u32
        } else {
            let index = (-self.0 - 1) as usize;
            match MCS_RATES_BPS.get(index) {
                Some(&bps) => bps,
                None => {
                    let last = MCS_RATES_BPS[MCS_RATES_BPS.len() - 1];
                    last + (index + 1 - MCS_RATES_BPS.len()) as u32 * 6_500_000
                }
            }
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "MCS{}", -self.0 - 1)
        } else if self.0 == 0 {
            f.write_str("unset")
        } else {
            write!(f, "{}bps", self.0)
        }
    }
}

impl fmt::Debug for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

/// Lowers `rate` by `levels` discrete steps.
///
/// Positive rates step down the legacy rate table and never drop below
/// [`DEFAULT_RADIO_DATARATE_LOWEST`]; the floor check tests the rate *before* each step, so the
/// result parks exactly at the floor. Negative rates step towards MCS0 and saturate there.
/// Rates not present in the table are returned unchanged.
pub fn step_down(rate: DataRate, levels: u32) -> DataRate {
    if rate.0 < 0 {
        let mut raw = rate.0;
        for _ in 0..levels {
            if raw < -1 {
                raw += 1;
            }
        }
        return DataRate(raw);
    }

    let mut index = match LEGACY_RATES_BPS.iter().position(|&r| r == rate.0) {
        Some(i) => i,
        None => return rate,
    };
    for _ in 0..levels {
        if index > 0
            && DataRate(LEGACY_RATES_BPS[index]).bits_per_sec()
                > DEFAULT_RADIO_DATARATE_LOWEST as u32
        {
            index -= 1;
        }
    }
    DataRate(LEGACY_RATES_BPS[index])
}

/// Computes the outbound datarate for one packet on one TX interface of a vehicle radio link.
///
/// Applies, in order: the link's uplink datarate mode, the adaptive-video narrowing chain, the
/// per-card override, and (for driver families that take a per-packet rate at all) the lost-link
/// fallback. The adaptive chain only ever narrows: a candidate replaces the current plan only if
/// it is slower in bits per second.
pub fn plan_uplink_datarate(
    link: &VehicleLinkParams,
    interface: &RadioInterface,
    overrides: &InterfaceOverrides,
    video: &VideoDatarates,
    link_to_controller_lost: bool,
) -> DataRate {
    let mut rate = match link.uplink_datarate_mode {
        UplinkDatarateMode::Fixed => link.uplink_datarate_data,
        UplinkDatarateMode::SameAsAdaptiveVideo => {
            let mut rate = link.datarate_video;
            if !video.user_rate.is_unset() && video.user_rate.bits_per_sec() < rate.bits_per_sec() {
                rate = video.user_rate;
            }
            if let Some(received) = video.received_profile {
                if received != video.user_profile
                    && !video.received_rate.is_unset()
                    && video.received_rate.bits_per_sec() < rate.bits_per_sec()
                {
                    rate = video.received_rate;
                }
            }
            rate
        }
        UplinkDatarateMode::Lowest => {
            if link.datarate_video.raw() > 0 {
                DataRate::LOWEST
            } else {
                DataRate::MCS0
            }
        }
    };

    let card = overrides.datarate_override;
    if !card.is_unset() && card.bits_per_sec() < rate.bits_per_sec() {
        rate = card;
    }

    // Atheros/Ralink rates are set out-of-band; nothing below applies to them.
    if interface.family.rate_set_out_of_band() {
        return rate;
    }

    if link_to_controller_lost {
        rate = if rate.raw() > 0 {
            DataRate::LOWEST
        } else {
            DataRate::MCS0
        };
    }

    rate
}
