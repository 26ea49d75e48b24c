//! Mock platform services shared by the unit tests.

use core::cell::Cell;
use core::mem;

use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use crate::config::{Config, Platform};
use crate::driver::{RadioDriver, SerialWrite};
use crate::event::{AlarmKind, EventSink, RouterControl};
use crate::link::datarate::DataRate;
use crate::link::packet::{Module, PacketHeader, PacketType};
use crate::link::pacer::SlowLinkAdmission;
use crate::link::registry::{DriverFamily, OverrideTable, RadioInterface, Registry};
use crate::link::topology::{
    GlobalFlags, LinkCapabilities, LocalRadioLink, ModelView, Topology, UplinkDatarateMode,
    VehicleLinkParams, VideoDatarates,
};
use crate::time::{Instant, Timer};
use crate::upload::{
    ArchiveSource, BuildStatus, CommandInbox, CommandResponse, UploadStatus, UploadUi,
};
use crate::Error;

/// Timer whose current time is set by the test.
pub struct MockTimer {
    pub now_micros: Cell<u64>,
}

impl MockTimer {
    pub fn new() -> Self {
        Self {
            now_micros: Cell::new(0),
        }
    }

    pub fn advance_millis(&self, millis: u64) {
        self.now_micros.set(self.now_micros.get() + millis * 1000);
    }
}

impl Timer for MockTimer {
    fn now(&self) -> Instant {
        Instant::from_raw_micros(self.now_micros.get())
    }
}

/// One frame recorded by the mock driver's WiFi path.
pub struct RecordedFrame {
    pub interface: usize,
    /// The injection "frame" is just the payload; the mock adds no driver overhead.
    pub bytes: Vec<u8>,
    pub rate: DataRate,
    pub frame_flags: u32,
    pub port: u8,
    pub encrypt: bool,
    pub local_link_id: usize,
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum SerialMode {
    Ok,
    Retry,
    Dead,
}

pub struct MockDriver {
    pub wifi_frames: Vec<RecordedFrame>,
    pub serial_writes: Vec<(usize, Vec<u8>)>,
    pub serial_mode: SerialMode,
    pub wifi_write_ok: bool,
    pub sik: [bool; crate::link::MAX_RADIO_INTERFACES],
    pub air_rate: u32,
    pub reinit_requests: Vec<usize>,
    pub sleeps_micros: Vec<u32>,
    cur_rate: DataRate,
    cur_flags: u32,
    pending: Option<(usize, u8, bool)>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            wifi_frames: Vec::new(),
            serial_writes: Vec::new(),
            serial_mode: SerialMode::Ok,
            wifi_write_ok: true,
            sik: [false; crate::link::MAX_RADIO_INTERFACES],
            air_rate: 2400,
            reinit_requests: Vec::new(),
            sleeps_micros: Vec::new(),
            cur_rate: DataRate::UNSET,
            cur_flags: 0,
            pending: None,
        }
    }
}

impl RadioDriver for MockDriver {
    fn set_frame_flags(&mut self, flags: u32) {
        self.cur_flags = flags;
    }

    fn set_out_datarate(&mut self, rate: DataRate) {
        self.cur_rate = rate;
    }

    fn build_raw_frame(
        &mut self,
        local_link_id: usize,
        out: &mut [u8],
        payload: &[u8],
        port: u8,
        encrypt: bool,
    ) -> Result<usize, Error> {
        if out.len() < payload.len() {
            return Err(Error::Eof);
        }
        out[..payload.len()].copy_from_slice(payload);
        self.pending = Some((local_link_id, port, encrypt));
        Ok(payload.len())
    }

    fn write_raw_frame(&mut self, interface: usize, frame: &[u8]) -> bool {
        if !self.wifi_write_ok {
            return false;
        }
        let (local_link_id, port, encrypt) = self.pending.take().unwrap_or((0, 0, false));
        self.wifi_frames.push(RecordedFrame {
            interface,
            bytes: frame.to_vec(),
            rate: self.cur_rate,
            frame_flags: self.cur_flags,
            port,
            encrypt,
            local_link_id,
        });
        true
    }

    fn serial_send(&mut self, interface: usize, bytes: &[u8]) -> SerialWrite {
        self.serial_writes.push((interface, bytes.to_vec()));
        match self.serial_mode {
            SerialMode::Ok => SerialWrite::Written(bytes.len()),
            SerialMode::Retry => SerialWrite::Retry,
            SerialMode::Dead => SerialWrite::InterfaceDead,
        }
    }

    fn is_sik_radio(&self, interface: usize) -> bool {
        self.sik.get(interface).copied().unwrap_or(false)
    }

    fn sik_air_baudrate_bytes(&self, _interface: usize) -> u32 {
        self.air_rate
    }

    fn schedule_sik_reinit(&mut self, interface: usize) {
        self.reinit_requests.push(interface);
    }

    fn sleep_micros(&mut self, micros: u32) {
        self.sleeps_micros.push(micros);
    }
}

pub struct MockEvents {
    pub alarms: Vec<(AlarmKind, u32, u32)>,
    pub router: Vec<RouterControl>,
}

impl MockEvents {
    pub fn new() -> Self {
        Self {
            alarms: Vec::new(),
            router: Vec::new(),
        }
    }
}

impl EventSink for MockEvents {
    fn send_alarm(&mut self, kind: AlarmKind, payload: u32, aux: u32) {
        self.alarms.push((kind, payload, aux));
    }

    fn send_router_control(&mut self, msg: RouterControl) {
        self.router.push(msg);
    }
}

pub struct MockAdmission {
    pub deny_types: Vec<u8>,
    pub calls: usize,
}

impl MockAdmission {
    pub fn new() -> Self {
        Self {
            deny_types: Vec::new(),
            calls: 0,
        }
    }
}

impl SlowLinkAdmission for MockAdmission {
    fn can_send_packet_on_slow_link(
        &mut self,
        _local_link_id: usize,
        packet_type: u8,
        _priority: u8,
        _now: Instant,
    ) -> bool {
        self.calls += 1;
        !self.deny_types.contains(&packet_type)
    }
}

pub struct MockInbox {
    pub responses: VecDeque<CommandResponse>,
}

impl MockInbox {
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
        }
    }
}

impl CommandInbox for MockInbox {
    fn poll_response(&mut self) -> Option<CommandResponse> {
        self.responses.pop_front()
    }
}

pub struct MockUi {
    pub progress: Vec<u8>,
    pub completions: Vec<UploadStatus>,
    pub messages: Vec<String>,
    pub cancel: bool,
}

impl MockUi {
    pub fn new() -> Self {
        Self {
            progress: Vec::new(),
            completions: Vec::new(),
            messages: Vec::new(),
            cancel: false,
        }
    }
}

impl UploadUi for MockUi {
    fn on_progress(&mut self, percent: u8) {
        self.progress.push(percent);
    }

    fn on_complete(&mut self, status: UploadStatus) {
        self.completions.push(status);
    }

    fn on_message(&mut self, message: &str) {
        self.messages.push(String::from(message));
    }

    fn cancel_requested(&mut self) -> bool {
        self.cancel
    }
}

pub struct MockArchive {
    pub state: BuildStatus,
    pub bytes: Vec<u8>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self {
            state: BuildStatus::Ready,
            bytes: Vec::new(),
        }
    }
}

impl ArchiveSource for MockArchive {
    fn poll_build(&mut self) -> BuildStatus {
        self.state
    }

    fn data(&self) -> &[u8] {
        &self.bytes
    }
}

/// Marker type wiring the mocks into a [`Config`].
pub enum TestConfig {}

impl Config for TestConfig {
    type Timer = MockTimer;
    type Driver = MockDriver;
    type Events = MockEvents;
    type Admission = MockAdmission;
    type Inbox = MockInbox;
    type Ui = MockUi;
    type Archive = MockArchive;
}

/// A fully mocked platform.
pub fn platform() -> Platform<TestConfig> {
    Platform {
        timer: MockTimer::new(),
        driver: MockDriver::new(),
        events: MockEvents::new(),
        admission: MockAdmission::new(),
        inbox: MockInbox::new(),
        ui: MockUi::new(),
        archive: MockArchive::new(),
    }
}

/// An interface with the given MAC tail, TX capable and opened for write.
pub fn iface(mac_tail: u8, family: DriverFamily, frequency_khz: u32) -> RadioInterface {
    RadioInterface {
        mac: [0x02, 0x00, 0x00, 0x00, 0x00, mac_tail],
        family,
        tx_capable: true,
        opened_for_write: true,
        frequency_khz,
    }
}

/// Vehicle link parameters with sane defaults for tests.
pub fn link_params() -> VehicleLinkParams {
    VehicleLinkParams {
        capabilities: LinkCapabilities::CAN_TX | LinkCapabilities::HIGH_CAPACITY,
        datarate_video: DataRate::from_bps(18_000_000),
        uplink_datarate_data: DataRate::from_bps(18_000_000),
        uplink_datarate_mode: UplinkDatarateMode::Fixed,
        radio_flags: 0,
        sik_packet_size: 0,
    }
}

/// Owns everything a [`ModelView`] borrows.
pub struct TestModel {
    pub registry: Registry,
    pub overrides: OverrideTable,
    pub topology: Topology,
    pub stats: crate::link::stats::LinkStatsView,
    pub video: VideoDatarates,
    pub flags: GlobalFlags,
}

impl TestModel {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            overrides: OverrideTable::new(),
            topology: Topology::new(),
            stats: crate::link::stats::LinkStatsView::new(),
            video: VideoDatarates::default(),
            flags: GlobalFlags::default(),
        }
    }

    pub fn add_wifi_interface(&mut self) -> u8 {
        let tail = self.registry.len() as u8;
        self.registry
            .push(iface(tail, DriverFamily::WiFi80211, 5_800_000))
            .unwrap() as u8
    }

    pub fn add_serial_interface(&mut self) -> u8 {
        let tail = self.registry.len() as u8;
        self.registry
            .push(iface(tail, DriverFamily::SerialSik, 433_000))
            .unwrap() as u8
    }

    pub fn add_link(&mut self, vehicle_link_id: u8, interfaces: &[u8], caps: LinkCapabilities) {
        let mut link = LocalRadioLink {
            vehicle_link_id,
            interfaces: heapless::Vec::new(),
            params: link_params(),
        };
        link.params.capabilities = caps;
        for &i in interfaces {
            link.interfaces.push(i).unwrap();
        }
        self.topology.push(link).unwrap();
    }

    pub fn set_rank(&mut self, interface: u8, rank: u8) {
        let mac = self.registry.get(usize::from(interface)).unwrap().mac;
        let mut overrides = self.overrides.get(&mac);
        overrides.preferred_tx_rank = rank;
        self.overrides.set(mac, overrides).unwrap();
    }

    pub fn view(&self) -> ModelView<'_> {
        ModelView {
            registry: &self.registry,
            overrides: &self.overrides,
            topology: &self.topology,
            stats: &self.stats,
            video: &self.video,
            flags: self.flags,
            controller_id: 0xC0DE,
            vehicle_id: 0xD01E,
        }
    }
}

/// Builds a `(header, payload)` packet with `payload_len` zero bytes of payload.
pub fn make_packet(
    kind: PacketType,
    module: Module,
    stream_id: u8,
    payload_len: usize,
) -> Vec<u8> {
    let total = mem::size_of::<PacketHeader>() + payload_len;
    let header = PacketHeader {
        crc: 0,
        packet_flags: module.into(),
        packet_type: kind.into(),
        stream_packet_idx: u32::from(stream_id) << crate::link::packet::STREAM_INDEX_SHIFT,
        radio_link_packet_index: 0,
        total_length: total as u16,
        vehicle_id_src: 0xC0DE,
        vehicle_id_dest: 0xD01E,
    };
    let mut buf = vec![0u8; total];
    buf[..mem::size_of::<PacketHeader>()].copy_from_slice(zerocopy::AsBytes::as_bytes(&header));
    buf
}
