//! Packet pacing for bandwidth-constrained serial radios.
//!
//! Serial SiK modems move a few kilobytes per second; blindly forwarding the uplink stream would
//! drown them. The pacer consults a per-packet admission policy and a per-interface airtime
//! budget, and *drops* packets from the serial link rather than queueing them (ordering between
//! admitted packets is preserved, and the high-rate links still carry everything).

use core::mem;

use zerocopy::LayoutVerified;

use crate::driver::{RadioDriver, SerialWrite};
use crate::event::{AlarmKind, EventSink};
use crate::link::envelope::Sequencer;
use crate::link::packet::{self, PacketHeader, ShortHeader};
use crate::link::stats::TxMeter;
use crate::link::DEFAULT_RADIO_SERIAL_MAX_TX_LOAD;
use crate::time::{Duration, Instant};

/// Minimum spacing between two data-overload alarms.
const OVERLOAD_ALARM_INTERVAL: Duration = Duration::from_secs(20);

/// Air rate assumed for serial interfaces the driver cannot query, in bytes per second.
const FALLBACK_AIR_RATE: u32 = 9600 / 8;

/// Admission policy consulted before every packet sent on a slow serial link.
///
/// Implementations typically admit by packet type and recency (eg. telemetry at a fixed cadence,
/// commands always). Denied packets are dropped from the serial link only.
pub trait SlowLinkAdmission {
    fn can_send_packet_on_slow_link(
        &mut self,
        local_link_id: usize,
        packet_type: u8,
        priority: u8,
        now: Instant,
    ) -> bool;
}

/// Enforces admission and airtime budgets on the serial TX path.
pub struct SerialPacer {
    last_overload_alarm: Option<Instant>,
}

impl SerialPacer {
    pub fn new() -> Self {
        Self {
            last_overload_alarm: None,
        }
    }

    /// Sends the chained packets in `buffer` over a serial interface.
    ///
    /// Packets denied admission or exceeding the airtime budget are skipped without failing the
    /// call. Returns `false` when a driver write failed or the interface is not writable; a
    /// wedged interface additionally aborts the remaining chain and schedules a reinit.
    pub fn send_chain<D, E, A>(
        &mut self,
        seq: &mut Sequencer,
        meter: &mut TxMeter,
        local_link_id: usize,
        interface_index: usize,
        opened_for_write: bool,
        sik_packet_size: u16,
        driver: &mut D,
        events: &mut E,
        admission: &mut A,
        buffer: &mut [u8],
        now: Instant,
    ) -> bool
    where
        D: RadioDriver,
        E: EventSink,
        A: SlowLinkAdmission,
    {
        let air_rate = if driver.is_sik_radio(interface_index) {
            driver.sik_air_baudrate_bytes(interface_index)
        } else {
            FALLBACK_AIR_RATE
        };
        let budget = DEFAULT_RADIO_SERIAL_MAX_TX_LOAD * air_rate / 100;

        let mut all_sent = true;
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

            if !admission.can_send_packet_on_slow_link(local_link_id, header.packet_type, 1, now) {
                offset += len;
                continue;
            }

            if air_rate > 0 && meter.bytes_per_sec(interface_index) >= budget {
                self.alarm_overload(events, meter, interface_index, air_rate, now);
                offset += len;
                continue;
            }

            let link_index = seq.next_link_packet_index(local_link_id);
            if let Some(h) = packet::header_mut(buffer, offset) {
                h.radio_link_packet_index = link_index;
            }
            if packet::stamp_checksum(buffer, offset).is_err() {
                break;
            }

            if opened_for_write {
                match driver.serial_send(interface_index, &buffer[offset..offset + len]) {
                    SerialWrite::Written(n) if n > 0 => {
                        let mut billed = len as u32;
                        if sik_packet_size > 0 {
                            billed += (mem::size_of::<ShortHeader>()
                                * (len / usize::from(sik_packet_size)))
                                as u32;
                        }
                        meter.record(interface_index, billed, now);
                    }
                    SerialWrite::InterfaceDead => {
                        all_sent = false;
                        warn!(
                            "Failed to write to serial radio interface {}.",
                            interface_index + 1
                        );
                        driver.schedule_sik_reinit(interface_index);
                        break;
                    }
                    _ => {
                        all_sent = false;
                        warn!(
                            "Failed to write to serial radio interface {}.",
                            interface_index + 1
                        );
                    }
                }
            } else {
                all_sent = false;
                warn!(
                    "Radio serial interface {} is not opened for write. Can't send packet on it.",
                    interface_index + 1
                );
            }

            offset += len;
        }

        all_sent
    }

    fn alarm_overload<E: EventSink>(
        &mut self,
        events: &mut E,
        meter: &TxMeter,
        interface_index: usize,
        air_rate: u32,
        now: Instant,
    ) {
        if let Some(last) = self.last_overload_alarm {
            if now.duration_since(last) < OVERLOAD_ALARM_INTERVAL {
                return;
            }
        }
        self.last_overload_alarm = Some(now);
        let rate = meter.bytes_per_sec(interface_index);
        warn!(
            "Radio interface {} is tx overloaded: sending {} bytes/sec and air data rate is {} bytes/sec",
            interface_index + 1,
            rate,
            air_rate
        );
        events.send_alarm(
            AlarmKind::RadioLinkDataOverload,
            (rate & 0x00FF_FFFF) | ((interface_index as u32) << 24),
            air_rate,
        );
    }
}

impl Default for SerialPacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::packet::{Module, PacketType};
    use crate::testutil::{make_packet, MockAdmission, MockDriver, MockEvents};

    fn pacer_env() -> (Sequencer, TxMeter, MockDriver, MockEvents, MockAdmission) {
        let mut driver = MockDriver::new();
        driver.sik[0] = true;
        driver.air_rate = 2400;
        (
            Sequencer::new(),
            TxMeter::new(),
            driver,
            MockEvents::new(),
            MockAdmission::new(),
        )
    }

    #[test]
    fn sends_and_bills_framing_overhead() {
        let (mut seq, mut meter, mut driver, mut events, mut admission) = pacer_env();
        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 100);
        let total = buf.len();
        let now = Instant::from_raw_micros(0);

        let ok = SerialPacer::new().send_chain(
            &mut seq, &mut meter, 0, 0, true, 64, &mut driver, &mut events, &mut admission,
            &mut buf, now,
        );
        assert!(ok);
        assert_eq!(driver.serial_writes.len(), 1);

        // Roll the window to observe the billed byte count.
        meter.record(0, 0, now + Duration::from_secs(2));
        let billed = total as u32
            + (mem::size_of::<ShortHeader>() as u32) * (total as u32 / 64);
        assert_eq!(meter.bytes_per_sec(0), billed);
    }

    #[test]
    fn admission_denied_drops_without_failing() {
        let (mut seq, mut meter, mut driver, mut events, mut admission) = pacer_env();
        admission.deny_types.push(PacketType::TelemetryRaw.into());
        let mut buf = make_packet(PacketType::TelemetryRaw, Module::Telemetry, 2, 10);
        buf.extend_from_slice(&make_packet(PacketType::Command, Module::Commands, 0, 10));

        let ok = SerialPacer::new().send_chain(
            &mut seq, &mut meter, 0, 0, true, 64, &mut driver, &mut events, &mut admission,
            &mut buf, Instant::from_raw_micros(0),
        );
        assert!(ok);
        // Only the command packet went out, and only it consumed a link index.
        assert_eq!(driver.serial_writes.len(), 1);
        let (_, bytes) = &driver.serial_writes[0];
        let header = crate::link::packet::sub_packets(bytes).next().unwrap().1;
        assert_eq!(header.kind(), PacketType::Command);
        assert_eq!({ header.radio_link_packet_index }, 1);
    }

    #[test]
    fn overload_drops_and_alarms_once_per_interval() {
        let (mut seq, mut meter, mut driver, mut events, mut admission) = pacer_env();
        let mut pacer = SerialPacer::new();
        let t0 = Instant::from_raw_micros(0);

        // Drive the measured rate to 2000 B/s (budget is 80% of 2400 = 1920).
        meter.record(0, 2000, t0);
        meter.record(0, 0, t0 + Duration::from_millis(1001));

        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 80);
        let now = t0 + Duration::from_millis(1002);
        let ok = pacer.send_chain(
            &mut seq, &mut meter, 0, 0, true, 64, &mut driver, &mut events, &mut admission,
            &mut buf, now,
        );
        assert!(ok);
        assert!(driver.serial_writes.is_empty());
        assert_eq!(events.alarms.len(), 1);
        let (kind, payload, aux) = events.alarms[0];
        assert_eq!(kind, AlarmKind::RadioLinkDataOverload);
        assert_eq!(payload & 0x00FF_FFFF, 2000);
        assert_eq!(payload >> 24, 0);
        assert_eq!(aux, 2400);

        // A second overload within 20 s stays silent.
        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 80);
        pacer.send_chain(
            &mut seq, &mut meter, 0, 0, true, 64, &mut driver, &mut events, &mut admission,
            &mut buf, now + Duration::from_secs(5),
        );
        assert_eq!(events.alarms.len(), 1);

        // After the interval it fires again.
        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 80);
        pacer.send_chain(
            &mut seq, &mut meter, 0, 0, true, 64, &mut driver, &mut events, &mut admission,
            &mut buf, now + Duration::from_secs(25),
        );
        assert_eq!(events.alarms.len(), 2);
    }

    #[test]
    fn dead_interface_aborts_chain_and_schedules_reinit() {
        let (mut seq, mut meter, mut driver, mut events, mut admission) = pacer_env();
        driver.serial_mode = crate::testutil::SerialMode::Dead;
        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 10);
        buf.extend_from_slice(&make_packet(PacketType::Command, Module::Commands, 0, 10));

        let ok = SerialPacer::new().send_chain(
            &mut seq, &mut meter, 0, 0, true, 64, &mut driver, &mut events, &mut admission,
            &mut buf, Instant::from_raw_micros(0),
        );
        assert!(!ok);
        assert_eq!(driver.reinit_requests, &[0]);
        // Only the first chain member was attempted.
        assert_eq!(driver.serial_writes.len(), 1);
    }

    #[test]
    fn unopened_interface_fails_the_call() {
        let (mut seq, mut meter, mut driver, mut events, mut admission) = pacer_env();
        let mut buf = make_packet(PacketType::Command, Module::Commands, 0, 10);
        let ok = SerialPacer::new().send_chain(
            &mut seq, &mut meter, 0, 0, false, 64, &mut driver, &mut events, &mut admission,
            &mut buf, Instant::from_raw_micros(0),
        );
        assert!(!ok);
        assert!(driver.serial_writes.is_empty());
    }
}
