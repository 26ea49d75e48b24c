//! The egress dispatcher: `send` composes selection, datarate planning, sequencing, pacing and
//! the driver writes across all eligible local radio links.

use core::mem;

use zerocopy::LayoutVerified;

use crate::config::{Config, Platform};
use crate::driver::{RadioDriver, RADIO_PORT_ROUTER_UPLINK};
use crate::event::{AlarmKind, EventSink};
use crate::link::datarate::plan_uplink_datarate;
use crate::link::envelope::Sequencer;
use crate::link::packet::{self, CommandHeader, Module, PacketHeader, PacketType};
use crate::link::pacer::SerialPacer;
use crate::link::selector::TxSelector;
use crate::link::stats::TxMeter;
use crate::link::topology::{LinkCapabilities, ModelView};
use crate::link::{MAX_PACKET_TOTAL_SIZE, MAX_RADIO_LINKS, MAX_RADIO_STREAMS};
use crate::time::{Duration, Instant, Timer};
use crate::utils::{Hex, HexSlice};

/// Minimum spacing between two missing-TX-interface alarms.
const NO_TX_ALARM_INTERVAL: Duration = Duration::from_secs(20);

/// Result of a [`Egress::send`] call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// At least one local radio link accepted the buffer.
    Sent,
    /// No link was eligible or had a TX interface.
    NoInterface,
    /// Every eligible link failed at the driver level.
    DriverError,
}

/// Restricts a send to a single local radio link (used by link tests).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkHint {
    /// Send on every eligible link.
    Any,
    /// Send only on the given local radio link.
    Only(u8),
}

/// The last command packet carried by the dispatcher, for ACK correlation by the command layer.
#[derive(Debug, Copy, Clone)]
pub struct CommandEcho {
    pub command_counter: u32,
    pub resend_counter: u8,
    pub sent_at: Instant,
}

/// Per-stream egress accounting.
#[derive(Debug, Copy, Clone, Default)]
pub struct StreamTxStats {
    /// Packets handed to at least one radio.
    pub packets: u32,
    /// Envelope bytes handed to at least one radio.
    pub bytes: u64,
    /// Duration of the last driver write carrying this stream, in microseconds.
    pub last_tx_micros: u32,
}

/// Process-wide egress state, owned by the dispatcher.
///
/// Created once at startup and dropped at shutdown; nothing in here is shared with other
/// threads.
pub struct EgressState {
    seq: Sequencer,
    meter: TxMeter,
    streams: [StreamTxStats; MAX_RADIO_STREAMS],
    any_packet_sent: bool,
    last_no_tx_alarm: [Option<Instant>; MAX_RADIO_LINKS],
    last_command: Option<CommandEcho>,
    last_tx_interface: [Option<u8>; MAX_RADIO_LINKS],
}

impl EgressState {
    pub fn new() -> Self {
        Self {
            seq: Sequencer::new(),
            meter: TxMeter::new(),
            streams: [StreamTxStats::default(); MAX_RADIO_STREAMS],
            any_packet_sent: false,
            last_no_tx_alarm: [None; MAX_RADIO_LINKS],
            last_command: None,
            last_tx_interface: [None; MAX_RADIO_LINKS],
        }
    }
}

/// The top-level egress dispatcher.
pub struct Egress {
    state: EgressState,
    selector: TxSelector,
    pacer: SerialPacer,
    /// Raw-frame scratch buffer, reused across sends. Never referenced after `send` returns.
    scratch: [u8; MAX_PACKET_TOTAL_SIZE],
}

impl Egress {
    pub fn new() -> Self {
        Self {
            state: EgressState::new(),
            selector: TxSelector::new(),
            pacer: SerialPacer::new(),
            scratch: [0; MAX_PACKET_TOTAL_SIZE],
        }
    }

    /// Returns the per-stream egress statistics.
    pub fn stream_stats(&self, stream: usize) -> StreamTxStats {
        self.state.streams[stream % MAX_RADIO_STREAMS]
    }

    /// Returns whether any packet was ever handed to a radio.
    pub fn any_packet_sent(&self) -> bool {
        self.state.any_packet_sent
    }

    /// Returns the last command packet observed by the dispatcher.
    pub fn last_command(&self) -> Option<CommandEcho> {
        self.state.last_command
    }

    /// Returns the TX interface most recently used for a local radio link.
    pub fn last_tx_interface(&self, local_link_id: usize) -> Option<u8> {
        self.state.last_tx_interface[local_link_id % MAX_RADIO_LINKS]
    }

    /// Sends the chained packets in `buffer` on every eligible local radio link.
    ///
    /// `buffer` holds one or more `(header, payload)` packets back to back. Header fields
    /// (sequence numbers, link indices, checksums) are rewritten in place; payload bytes are
    /// never touched.
    pub fn send<C: Config>(
        &mut self,
        view: &ModelView<'_>,
        pf: &mut Platform<C>,
        buffer: &mut [u8],
        hint: LinkHint,
    ) -> SendOutcome {
        if buffer.len() < mem::size_of::<PacketHeader>() {
            return SendOutcome::NoInterface;
        }
        let now = pf.timer.now();

        // First pass: classify the chain and stamp stream sequence numbers.
        let mut hint = hint;
        let mut chained = [0u32; MAX_RADIO_STREAMS];
        let mut bytes_on_stream = [0u32; MAX_RADIO_STREAMS];
        let mut total_packets = 0u32;
        let mut ping_link: Option<u8> = None;
        let mut first_type = PacketType::Unknown(0);

        let mut offset = 0;
        while offset < buffer.len() {
            let header: PacketHeader =
                match LayoutVerified::<_, PacketHeader>::new_unaligned_from_prefix(
                    &buffer[offset..],
                ) {
                    Some((h, _)) => *h,
                    None => break,
                };
            let len = usize::from(header.total_length);
            if len < mem::size_of::<PacketHeader>() || len > buffer.len() - offset {
                break;
            }
            if total_packets == 0 {
                first_type = header.kind();
            }
            total_packets += 1;

            let payload = offset + mem::size_of::<PacketHeader>();
            match header.kind() {
                PacketType::Ping => {
                    // Payload: correlation id, then the bound local radio link id.
                    ping_link = buffer.get(payload + 1).copied();
                }
                PacketType::TestLink => {
                    if let Some(&link) = buffer.get(payload) {
                        hint = LinkHint::Only(link);
                    }
                }
                _ => {}
            }
            if header.module() == Module::Commands {
                if let Some((cmd, _)) = LayoutVerified::<_, CommandHeader>::new_unaligned_from_prefix(
                    &buffer[payload.min(buffer.len())..],
                ) {
                    self.state.last_command = Some(CommandEcho {
                        command_counter: cmd.command_counter,
                        resend_counter: cmd.resend_counter,
                        sent_at: now,
                    });
                }
            }

            let stream = usize::from(header.stream_id()) % MAX_RADIO_STREAMS;
            chained[stream] += 1;
            bytes_on_stream[stream] += len as u32;

            if let Some(h) = packet::header_mut(buffer, offset) {
                self.state
                    .seq
                    .stamp_stream(h, view.flags.received_invalid_packets);
            }
            offset += len;
        }

        let tx_map = self.selector.compute(view);

        let mut any_sent = false;
        let mut driver_error = false;

        for (local_id, link) in view.topology.iter().enumerate() {
            if local_id >= MAX_RADIO_LINKS {
                break;
            }
            let interface_index = match tx_map[local_id] {
                Some(i) => usize::from(i),
                None => {
                    self.alarm_no_tx_interface(&mut pf.events, local_id, now);
                    continue;
                }
            };
            if let LinkHint::Only(only) = hint {
                if usize::from(only) != local_id {
                    continue;
                }
            }
            let caps = link.params.capabilities;
            if caps.contains(LinkCapabilities::DISABLED) {
                continue;
            }
            if caps.contains(LinkCapabilities::USED_FOR_RELAY) {
                continue;
            }
            // Firmware uploads are single-path: the first link that accepts the buffer wins.
            if view.flags.update_in_progress && any_sent {
                break;
            }
            if total_packets == 1 && ping_link.is_some() && ping_link != Some(local_id as u8) {
                continue;
            }
            let interface = match view.registry.get(interface_index) {
                Some(i) => *i,
                None => continue,
            };
            if !interface.opened_for_write {
                continue;
            }

            self.state.last_tx_interface[local_id] = Some(interface_index as u8);

            let sent = if interface.family.is_serial() {
                if view.flags.update_in_progress {
                    continue;
                }
                self.pacer.send_chain(
                    &mut self.state.seq,
                    &mut self.state.meter,
                    local_id,
                    interface_index,
                    interface.opened_for_write,
                    link.params.sik_packet_size,
                    &mut pf.driver,
                    &mut pf.events,
                    &mut pf.admission,
                    buffer,
                    now,
                )
            } else {
                send_wifi(
                    &mut self.scratch,
                    &mut self.state.seq,
                    &mut self.state.meter,
                    &mut self.state.streams,
                    &chained,
                    view,
                    link,
                    local_id,
                    interface_index,
                    &interface,
                    pf,
                    buffer,
                    now,
                )
            };
            any_sent |= sent;
            driver_error |= !sent;
        }

        if any_sent {
            for stream in 0..MAX_RADIO_STREAMS {
                if chained[stream] == 0 {
                    continue;
                }
                self.state.streams[stream].packets += chained[stream];
                self.state.streams[stream].bytes += u64::from(bytes_on_stream[stream]);
            }
            self.state.any_packet_sent = true;
            SendOutcome::Sent
        } else {
            self.log_nothing_sent(view, &tx_map, first_type);
            if driver_error {
                SendOutcome::DriverError
            } else {
                SendOutcome::NoInterface
            }
        }
    }

    fn alarm_no_tx_interface<E: EventSink>(&mut self, events: &mut E, local_id: usize, now: Instant) {
        let slot = local_id % MAX_RADIO_LINKS;
        if let Some(last) = self.state.last_no_tx_alarm[slot] {
            if now.duration_since(last) < NO_TX_ALARM_INTERVAL {
                return;
            }
        }
        self.state.last_no_tx_alarm[slot] = Some(now);
        warn!(
            "No radio interfaces on controller can send data on local radio link {}",
            local_id + 1
        );
        events.send_alarm(AlarmKind::NoTxInterface, local_id as u32, 0);
    }

    fn log_nothing_sent(&self, view: &ModelView<'_>, tx_map: &[Option<u8>], first_type: PacketType) {
        warn!(
            "Packet not sent! No radio interface could send it. First packet type: {:?}",
            first_type
        );
        warn!("Current local radio links: {}", view.topology.len());
        for (local_id, link) in view.topology.iter().enumerate() {
            let interface_index = match tx_map.get(local_id).copied().flatten() {
                Some(i) => usize::from(i),
                None => {
                    warn!(
                        "No radio interfaces assigned for TX on local radio link {}.",
                        local_id + 1
                    );
                    continue;
                }
            };
            match view.registry.get(interface_index) {
                Some(interface) => warn!(
                    "TX on local radio link {}, vehicle radio link {}: interface {} (MAC {:?}), freq: {} kHz, link capabilities: {:?}",
                    local_id + 1,
                    link.vehicle_link_id + 1,
                    interface_index + 1,
                    HexSlice(interface.mac),
                    interface.frequency_khz,
                    Hex(link.params.capabilities.bits())
                ),
                None => warn!(
                    "Can't get interface info for radio interface {}",
                    interface_index + 1
                ),
            }
        }
    }
}

impl Default for Egress {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends the whole buffer as a single injection frame on an 802.11-class interface.
fn send_wifi<C: Config>(
    scratch: &mut [u8],
    seq: &mut Sequencer,
    meter: &mut TxMeter,
    streams: &mut [StreamTxStats; MAX_RADIO_STREAMS],
    chained: &[u32; MAX_RADIO_STREAMS],
    view: &ModelView<'_>,
    link: &crate::link::topology::LocalRadioLink,
    local_id: usize,
    interface_index: usize,
    interface: &crate::link::registry::RadioInterface,
    pf: &mut Platform<C>,
    buffer: &mut [u8],
    now: Instant,
) -> bool {
    pf.driver.set_frame_flags(link.params.radio_flags);
    let overrides = view.overrides.get(&interface.mac);
    let rate = plan_uplink_datarate(
        &link.params,
        interface,
        &overrides,
        view.video,
        view.flags.link_to_controller_lost,
    );
    pf.driver.set_out_datarate(rate);

    if seq.stamp_link(buffer, local_id).is_err() {
        return false;
    }

    let encrypt = view
        .flags
        .encryption
        .encrypt_uplink(view.flags.has_passphrase);
    let frame_len = match pf.driver.build_raw_frame(
        local_id,
        scratch,
        buffer,
        RADIO_PORT_ROUTER_UPLINK,
        encrypt,
    ) {
        Ok(len) => len,
        Err(_) => return false,
    };

    if !pf.driver.write_raw_frame(interface_index, &scratch[..frame_len]) {
        warn!("Failed to write to radio interface {}.", interface_index + 1);
        return false;
    }

    meter.record(interface_index, buffer.len() as u32, now);
    let elapsed = pf.timer.now().duration_since(now).as_micros();
    for stream in 0..MAX_RADIO_STREAMS {
        if chained[stream] > 0 {
            streams[stream].last_tx_micros = elapsed;
        }
    }

    if let Some((header, _)) =
        LayoutVerified::<_, PacketHeader>::new_unaligned_from_prefix(&buffer[..])
    {
        if header.kind() == PacketType::SikConfig {
            let payload = mem::size_of::<PacketHeader>();
            if let (Some(&vehicle_link), Some(&command)) =
                (buffer.get(payload), buffer.get(payload + 1))
            {
                info!(
                    "Sent radio packet to vehicle to configure SiK vehicle radio link {}, command: {}",
                    vehicle_link + 1,
                    command
                );
            }
        }
    }

    pf.driver.sleep_micros(200);
    true
}
