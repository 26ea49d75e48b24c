//! TX interface selection.
//!
//! For each local radio link, exactly one interface carries the uplink. Operator preference
//! outranks measured quality: if any eligible card has a positive preferred-TX rank, the lowest
//! rank wins and RX quality is not consulted at all.

use crate::link::registry::CardCapabilities;
use crate::link::topology::{LinkCapabilities, ModelView};
use crate::link::MAX_RADIO_LINKS;

/// The selected TX interface per local radio link; `None` means the link cannot transmit.
pub type TxMap = [Option<u8>; MAX_RADIO_LINKS];

/// Stateful TX selector.
///
/// The state only exists for logging: the first computed assignment is logged in full, later
/// computations only log changes.
pub struct TxSelector {
    last: Option<TxMap>,
}

impl TxSelector {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Computes the TX interface for every local radio link.
    pub fn compute(&mut self, view: &ModelView<'_>) -> TxMap {
        let mut map: TxMap = [None; MAX_RADIO_LINKS];

        for (local_id, link) in view.topology.iter().enumerate() {
            if local_id >= MAX_RADIO_LINKS {
                break;
            }
            // Disabled links keep their assignment; the dispatcher skips them without raising
            // the missing-interface alarm. Only links that can never carry uplink traffic get
            // no interface here.
            let caps = link.params.capabilities;
            if caps.contains(LinkCapabilities::USED_FOR_RELAY)
                || !caps.contains(LinkCapabilities::CAN_TX)
            {
                continue;
            }

            let mut preferred: Option<(u8, u8)> = None; // (rank, interface)
            let mut best_quality: Option<(i32, u8)> = None;

            for &index in link.interfaces.iter() {
                let interface = match view.registry.get(usize::from(index)) {
                    Some(i) => i,
                    None => continue,
                };
                if !interface.tx_capable {
                    continue;
                }
                let overrides = view.overrides.get(&interface.mac);
                let card = overrides.capabilities;
                if card.contains(CardCapabilities::DISABLED)
                    || !card.contains(CardCapabilities::CAN_TX)
                    || !card.contains(CardCapabilities::CAN_USE_FOR_DATA)
                {
                    continue;
                }

                let rank = overrides.preferred_tx_rank;
                if rank > 0 {
                    // Strict < keeps the smaller interface index on rank ties.
                    if preferred.map_or(true, |(r, _)| rank < r) {
                        preferred = Some((rank, index));
                    }
                }
                let quality = view.stats.rx_quality(usize::from(index));
                if best_quality.map_or(true, |(q, _)| quality > q) {
                    best_quality = Some((quality, index));
                }
            }

            map[local_id] = match (preferred, best_quality) {
                (Some((_, index)), _) => Some(index),
                (None, Some((_, index))) => Some(index),
                (None, None) => None,
            };
        }

        self.log_assignment(view, &map);
        map
    }

    fn log_assignment(&mut self, view: &ModelView<'_>, map: &TxMap) {
        match &self.last {
            None => {
                for local_id in 0..view.topology.len().min(MAX_RADIO_LINKS) {
                    match map[local_id] {
                        Some(index) => info!(
                            "Assigned radio interface {} as TX interface for local radio link {}.",
                            index + 1,
                            local_id + 1
                        ),
                        None => warn!(
                            "No TX interface could be assigned to local radio link {}.",
                            local_id + 1
                        ),
                    }
                }
            }
            Some(last) if last != map => {
                for local_id in 0..MAX_RADIO_LINKS {
                    if last[local_id] != map[local_id] {
                        info!(
                            "TX interface for local radio link {} changed: {:?} -> {:?}",
                            local_id + 1,
                            last[local_id],
                            map[local_id]
                        );
                    }
                }
            }
            Some(_) => {}
        }
        self.last = Some(*map);
    }
}

impl Default for TxSelector {
    fn default() -> Self {
        Self::new()
    }
}
