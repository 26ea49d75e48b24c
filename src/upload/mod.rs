//! Chunked, ACK-based firmware upload to the vehicle.
//!
//! The engine cuts the update archive into fixed blocks and pushes them through the egress
//! dispatcher as ordinary command packets. Only every Nth block (and the last one) requires an
//! acknowledgement; the rest are fired twice, one-way. A rejected block rewinds the transfer to
//! the last acknowledged block, and the confirmation frequency adapts downwards when a transfer
//! fails.
//!
//! The engine is a cooperative state machine: it never blocks and never spawns threads. The
//! main loop calls [`UploadEngine::poll`] every tick and gets back an [`UploadCmd`] saying when
//! to call again, mirroring how the rest of the stack schedules itself.
//!
//! # Upload frame format
//!
//! Each block travels as `(PacketHeader, CommandHeader, UploadFrameHeader, payload)`:
//!
//! ```notrust
//! +--------------+---------------+--------------------+------------------------+
//! | u32 type     | u32 total     | u32 block index    | u8 last | u32 length   |
//! +--------------+---------------+--------------------+------------------------+
//! ```
//!
//! A block index of `u32::MAX` is the cancel marker understood by the vehicle.

use core::mem;

use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::bytes::ByteWriter;
use crate::config::{Config, Platform};
use crate::event::{EventSink, RouterControl};
use crate::link::egress::{Egress, LinkHint, SendOutcome};
use crate::link::packet::{CommandHeader, Module, PacketHeader, PacketType};
use crate::link::topology::ModelView;
use crate::time::{Duration, Instant, Timer};

/// Payload bytes per upload block.
pub const UPLOAD_BLOCK_SIZE: u32 = 1100;

/// Initial "ACK every N blocks" confirmation frequency.
pub const DEFAULT_UPLOAD_PACKET_CONFIRMATION_FREQUENCY: u32 = 10;

/// Command id of the firmware upload command.
pub const COMMAND_ID_UPLOAD_SOFTWARE: u8 = 63;

/// Block index marking a cancel frame.
pub const CANCEL_BLOCK_INDEX: u32 = core::u32::MAX;

const MAX_RESENDS_PER_SEGMENT: u8 = 15;
const SEGMENT_RETRY_BUDGET: i8 = 10;
const REPLY_TIMEOUT_INITIAL: Duration = Duration::from_millis(100);
const REPLY_TIMEOUT_STEP: Duration = Duration::from_millis(50);
const REPLY_TIMEOUT_MAX: Duration = Duration::from_millis(500);
const CANCEL_FRAME_COUNT: u8 = 5;
const CANCEL_FRAME_GAP: Duration = Duration::from_millis(20);
const ONE_WAY_GAP: Duration = Duration::from_millis(2);
const BUILD_POLL_INTERVAL: Duration = Duration::from_millis(5);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Wire header of one upload block.
#[derive(Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct UploadFrameHeader {
    pub update_type: u32,
    pub total_size: u32,
    pub file_block_index: u32,
    pub is_last_block: u8,
    pub block_length: u32,
}

/// Progress of the external archive builder.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    InProgress,
    Ready,
    Failed,
}

/// Provider of the firmware archive.
///
/// The worker thread that runs the archiver, along with the last-known-archive file and the
/// update-info marker, live behind this trait; the engine only polls for completion and borrows
/// the finished bytes.
pub trait ArchiveSource {
    /// Drives the build and reports its state. Called every engine tick while building.
    fn poll_build(&mut self) -> BuildStatus;

    /// The finished archive. Only called after `poll_build` returned [`BuildStatus::Ready`].
    fn data(&self) -> &[u8];
}

/// A command response received from the vehicle.
#[derive(Debug, Copy, Clone)]
pub struct CommandResponse {
    pub command_counter: u32,
    pub ok: bool,
}

/// Inbound command responses (ACKs), fed by the router RX path.
pub trait CommandInbox {
    /// Returns the next pending response, if any. Must not block.
    fn poll_response(&mut self) -> Option<CommandResponse>;
}

/// Terminal states of an upload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Done,
    Failed,
    Canceled,
}

/// Operator-facing surface of the upload engine.
pub trait UploadUi {
    /// Reports transfer progress, at most every 100 ms.
    fn on_progress(&mut self, percent: u8);

    /// Reports the terminal status of the upload.
    fn on_complete(&mut self, status: UploadStatus);

    /// Surfaces an operator-visible message.
    fn on_message(&mut self, message: &str);

    /// Polled between segments and during ACK waits; `true` aborts the upload.
    fn cancel_requested(&mut self) -> bool;
}

/// When the engine wants to be polled again.
#[derive(Debug, Copy, Clone)]
pub enum NextPoll {
    /// Call `poll` again on the next main-loop tick.
    Asap,
    /// Call `poll` again at the given time; nothing will happen earlier.
    At(Instant),
    /// The engine is idle; polling is pointless until the next `start`.
    Idle,
}

/// Command returned by [`UploadEngine::poll`].
#[must_use]
#[derive(Debug, Copy, Clone)]
pub struct UploadCmd {
    pub next_poll: NextPoll,
}

#[derive(Copy, Clone)]
enum Phase {
    Idle,
    Building,
    /// Decide and emit the next segment.
    Sending,
    /// First one-way copy went out; the second follows after the gap.
    OneWayGap { resume_at: Instant },
    /// An ACK-required segment is in flight.
    WaitAck {
        uid: u32,
        resends: u8,
        wait: Duration,
        deadline: Instant,
    },
    /// Emitting the cancel frame salvo before finishing as `status`.
    Canceling {
        frames_left: u8,
        next_at: Instant,
        status: UploadStatus,
        halve: bool,
    },
}

/// The reliable upload engine.
pub struct UploadEngine {
    phase: Phase,
    update_type: u32,
    /// Persists across jobs; halved after failed transfers.
    ack_every_n: u32,
    command_counter: u32,
    total_size: u32,
    total_blocks: u32,
    next_index: u32,
    last_acked: Option<u32>,
    retries_remaining: i8,
    last_progress_at: Option<Instant>,
    status: Option<UploadStatus>,
    frame_buf: [u8; 1500],
}

impl UploadEngine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            update_type: 0,
            ack_every_n: DEFAULT_UPLOAD_PACKET_CONFIRMATION_FREQUENCY,
            command_counter: 0,
            total_size: 0,
            total_blocks: 0,
            next_index: 0,
            last_acked: None,
            retries_remaining: SEGMENT_RETRY_BUDGET,
            last_progress_at: None,
            status: None,
            frame_buf: [0; 1500],
        }
    }

    /// Overrides the confirmation frequency (`ack_every_n`).
    pub fn set_ack_frequency(&mut self, every_n: u32) {
        self.ack_every_n = every_n.max(1);
    }

    /// Returns the current confirmation frequency.
    pub fn ack_frequency(&self) -> u32 {
        self.ack_every_n
    }

    /// Returns whether an upload is being built or transferred.
    ///
    /// The application mirrors this into [`GlobalFlags::update_in_progress`], which keeps the
    /// dispatcher single-path and off the serial links while the upload runs.
    ///
    /// [`GlobalFlags::update_in_progress`]: crate::link::topology::GlobalFlags
    pub fn in_progress(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Returns the terminal status of the most recent upload.
    pub fn status(&self) -> Option<UploadStatus> {
        self.status
    }

    /// Begins a new upload of the given update type.
    ///
    /// The archive build is driven by subsequent `poll` calls.
    pub fn start(&mut self, update_type: u32) {
        info!(
            "Starting software upload to vehicle (method 6.3), update type {}.",
            update_type
        );
        self.update_type = update_type;
        self.total_size = 0;
        self.total_blocks = 0;
        self.next_index = 0;
        self.last_acked = None;
        self.retries_remaining = SEGMENT_RETRY_BUDGET;
        self.last_progress_at = None;
        self.status = None;
        self.phase = Phase::Building;
    }

    /// Advances the upload state machine.
    pub fn poll<C: Config>(
        &mut self,
        view: &ModelView<'_>,
        pf: &mut Platform<C>,
        egress: &mut Egress,
    ) -> UploadCmd {
        let now = pf.timer.now();
        match self.phase {
            Phase::Idle => UploadCmd {
                next_poll: NextPoll::Idle,
            },
            Phase::Building => self.poll_building(pf, now),
            Phase::Sending => self.poll_sending(view, pf, egress, now),
            Phase::OneWayGap { resume_at } => {
                if now < resume_at {
                    return UploadCmd {
                        next_poll: NextPoll::At(resume_at),
                    };
                }
                // Second one-way copy of the current block.
                let uid = self.next_command_uid();
                self.send_block(view, pf, egress, self.next_index, uid, 0);
                self.next_index += 1;
                self.phase = Phase::Sending;
                UploadCmd {
                    next_poll: NextPoll::Asap,
                }
            }
            Phase::WaitAck {
                uid,
                resends,
                wait,
                deadline,
            } => self.poll_wait_ack(view, pf, egress, now, uid, resends, wait, deadline),
            Phase::Canceling {
                frames_left,
                next_at,
                status,
                halve,
            } => self.poll_canceling(view, pf, egress, now, frames_left, next_at, status, halve),
        }
    }

    fn poll_building<C: Config>(&mut self, pf: &mut Platform<C>, now: Instant) -> UploadCmd {
        if pf.ui.cancel_requested() {
            // Nothing was sent yet; no cancel frames and no router notification needed.
            info!("The software update was canceled by user.");
            self.finish(&mut pf.ui, UploadStatus::Canceled);
            return UploadCmd {
                next_poll: NextPoll::Idle,
            };
        }
        match pf.archive.poll_build() {
            BuildStatus::InProgress => {
                self.tick_progress(&mut pf.ui, now, 0);
                UploadCmd {
                    next_poll: NextPoll::At(now + BUILD_POLL_INTERVAL),
                }
            }
            BuildStatus::Failed => {
                pf.ui
                    .on_message("There was an error generating the upload package.");
                self.finish(&mut pf.ui, UploadStatus::Failed);
                UploadCmd {
                    next_poll: NextPoll::Idle,
                }
            }
            BuildStatus::Ready => {
                let size = pf.archive.data().len() as u32;
                if size == 0 {
                    pf.ui
                        .on_message("There was an error generating the upload package.");
                    self.finish(&mut pf.ui, UploadStatus::Failed);
                    return UploadCmd {
                        next_poll: NextPoll::Idle,
                    };
                }
                self.total_size = size;
                self.total_blocks = (size + UPLOAD_BLOCK_SIZE - 1) / UPLOAD_BLOCK_SIZE;
                info!(
                    "Uploading {} sw segments, {} bytes total.",
                    self.total_blocks, self.total_size
                );
                pf.events.send_router_control(RouterControl::UpdateStarted);
                self.phase = Phase::Sending;
                UploadCmd {
                    next_poll: NextPoll::Asap,
                }
            }
        }
    }

    fn poll_sending<C: Config>(
        &mut self,
        view: &ModelView<'_>,
        pf: &mut Platform<C>,
        egress: &mut Egress,
        now: Instant,
    ) -> UploadCmd {
        if pf.ui.cancel_requested() {
            info!("The software update was canceled by user.");
            self.enter_canceling(now, UploadStatus::Canceled, true);
            return UploadCmd {
                next_poll: NextPoll::Asap,
            };
        }

        if self.next_index >= self.total_blocks {
            // All blocks confirmed.
            pf.ui.on_progress(100);
            pf.events.send_router_control(RouterControl::UpdateStopped);
            info!("Successfully sent software package to vehicle.");
            self.finish(&mut pf.ui, UploadStatus::Done);
            return UploadCmd {
                next_poll: NextPoll::Idle,
            };
        }

        let index = self.next_index;
        let (_, _, is_last) = self.block_bounds(index);
        let ack_needed = is_last || index % self.ack_every_n == 0;
        self.tick_progress_for_block(&mut pf.ui, now, index);

        if !ack_needed {
            debug!(
                "Send sw package block {} of {}",
                index + 1,
                self.total_blocks
            );
            let uid = self.next_command_uid();
            self.send_block(view, pf, egress, index, uid, 0);
            self.phase = Phase::OneWayGap {
                resume_at: now + ONE_WAY_GAP,
            };
            return UploadCmd {
                next_poll: NextPoll::At(now + ONE_WAY_GAP),
            };
        }

        if is_last {
            info!(
                "Send last sw package with ack, segment {} of {}",
                index + 1,
                self.total_blocks
            );
        } else {
            debug!(
                "Send sw package with ack, segment {} of {}",
                index + 1,
                self.total_blocks
            );
        }
        let uid = self.next_command_uid();
        if !self.send_block(view, pf, egress, index, uid, 0) {
            pf.ui
                .on_message("There was an error uploading the software package.");
            self.enter_canceling(now, UploadStatus::Failed, true);
            return UploadCmd {
                next_poll: NextPoll::Asap,
            };
        }
        self.phase = Phase::WaitAck {
            uid,
            resends: 1,
            wait: REPLY_TIMEOUT_INITIAL,
            deadline: now + REPLY_TIMEOUT_INITIAL,
        };
        UploadCmd {
            next_poll: NextPoll::Asap,
        }
    }

    fn poll_wait_ack<C: Config>(
        &mut self,
        view: &ModelView<'_>,
        pf: &mut Platform<C>,
        egress: &mut Egress,
        now: Instant,
        uid: u32,
        resends: u8,
        wait: Duration,
        deadline: Instant,
    ) -> UploadCmd {
        if pf.ui.cancel_requested() {
            info!("The software update was canceled by user.");
            self.enter_canceling(now, UploadStatus::Canceled, true);
            return UploadCmd {
                next_poll: NextPoll::Asap,
            };
        }
        self.tick_progress_for_block(&mut pf.ui, now, self.next_index);

        while let Some(response) = pf.inbox.poll_response() {
            if response.command_counter != uid {
                continue;
            }
            if response.ok {
                debug!("Got ACK for segment {}", self.next_index + 1);
                self.retries_remaining = SEGMENT_RETRY_BUDGET;
                self.last_acked = Some(self.next_index);
                self.next_index += 1;
                self.phase = Phase::Sending;
            } else {
                warn!(
                    "The software package block (segment index {}) was rejected by the vehicle.",
                    self.next_index + 1
                );
                self.retries_remaining -= 1;
                if self.retries_remaining < 0 {
                    self.enter_canceling(now, UploadStatus::Failed, true);
                } else {
                    // Restart from the block after the last confirmed one.
                    self.next_index = self.last_acked.map_or(0, |i| i + 1);
                    self.phase = Phase::Sending;
                }
            }
            return UploadCmd {
                next_poll: NextPoll::Asap,
            };
        }

        if now >= deadline {
            if resends >= MAX_RESENDS_PER_SEGMENT {
                warn!("Did not get a confirmation from vehicle about the software upload.");
                // Plain timeout exhaustion does not adapt the confirmation frequency.
                self.enter_canceling(now, UploadStatus::Failed, false);
                return UploadCmd {
                    next_poll: NextPoll::Asap,
                };
            }
            let wait = (wait + REPLY_TIMEOUT_STEP).min(REPLY_TIMEOUT_MAX);
            debug!(
                "Waiting for ACK for SW package segment {}, for {} ms, on retry: {}",
                self.next_index + 1,
                wait.whole_millis(),
                resends
            );
            if !self.send_block(view, pf, egress, self.next_index, uid, resends) {
                pf.ui
                    .on_message("There was an error uploading the software package.");
                self.enter_canceling(now, UploadStatus::Failed, true);
                return UploadCmd {
                    next_poll: NextPoll::Asap,
                };
            }
            self.phase = Phase::WaitAck {
                uid,
                resends: resends + 1,
                wait,
                deadline: now + wait,
            };
        }
        UploadCmd {
            next_poll: NextPoll::Asap,
        }
    }

    fn poll_canceling<C: Config>(
        &mut self,
        view: &ModelView<'_>,
        pf: &mut Platform<C>,
        egress: &mut Egress,
        now: Instant,
        frames_left: u8,
        next_at: Instant,
        status: UploadStatus,
        halve: bool,
    ) -> UploadCmd {
        if now < next_at {
            return UploadCmd {
                next_poll: NextPoll::At(next_at),
            };
        }
        let uid = self.next_command_uid();
        self.send_cancel_frame(view, pf, egress, uid);
        let frames_left = frames_left - 1;
        if frames_left == 0 {
            pf.events.send_router_control(RouterControl::UpdateStopped);
            if halve && self.ack_every_n >= 2 {
                self.ack_every_n /= 2;
            }
            self.finish(&mut pf.ui, status);
            return UploadCmd {
                next_poll: NextPoll::Idle,
            };
        }
        self.phase = Phase::Canceling {
            frames_left,
            next_at: now + CANCEL_FRAME_GAP,
            status,
            halve,
        };
        UploadCmd {
            next_poll: NextPoll::At(now + CANCEL_FRAME_GAP),
        }
    }

    fn enter_canceling(&mut self, now: Instant, status: UploadStatus, halve: bool) {
        self.phase = Phase::Canceling {
            frames_left: CANCEL_FRAME_COUNT,
            next_at: now,
            status,
            halve,
        };
    }

    fn finish<U: UploadUi>(&mut self, ui: &mut U, status: UploadStatus) {
        self.status = Some(status);
        self.phase = Phase::Idle;
        ui.on_complete(status);
    }

    fn next_command_uid(&mut self) -> u32 {
        self.command_counter = self.command_counter.wrapping_add(1);
        self.command_counter
    }

    /// Byte range and last-block flag of a block index.
    fn block_bounds(&self, index: u32) -> (u32, u32, bool) {
        let offset = index * UPLOAD_BLOCK_SIZE;
        let len = UPLOAD_BLOCK_SIZE.min(self.total_size - offset);
        (offset, len, index + 1 == self.total_blocks)
    }

    fn tick_progress_for_block<U: UploadUi>(&mut self, ui: &mut U, now: Instant, index: u32) {
        let denom = (self.total_size / UPLOAD_BLOCK_SIZE).max(1);
        let percent = (index * 100 / denom).min(100) as u8;
        self.tick_progress(ui, now, percent);
    }

    fn tick_progress<U: UploadUi>(&mut self, ui: &mut U, now: Instant, percent: u8) {
        match self.last_progress_at {
            Some(last) if now.duration_since(last) < PROGRESS_INTERVAL => {}
            _ => {
                self.last_progress_at = Some(now);
                ui.on_progress(percent);
            }
        }
    }

    /// Composes and sends one upload block (`resend` > 0 marks a retry of an ACKed segment).
    fn send_block<C: Config>(
        &mut self,
        view: &ModelView<'_>,
        pf: &mut Platform<C>,
        egress: &mut Egress,
        index: u32,
        uid: u32,
        resend: u8,
    ) -> bool {
        let (offset, len, is_last) = self.block_bounds(index);
        let frame = UploadFrameHeader {
            update_type: self.update_type,
            total_size: self.total_size,
            file_block_index: index,
            is_last_block: is_last as u8,
            block_length: len,
        };
        let total = match compose_command_packet(
            &mut self.frame_buf,
            view,
            uid,
            resend,
            &frame,
            &pf.archive.data()[offset as usize..(offset + len) as usize],
        ) {
            Ok(total) => total,
            Err(_) => return false,
        };
        egress.send(view, pf, &mut self.frame_buf[..total], LinkHint::Any) == SendOutcome::Sent
    }

    fn send_cancel_frame<C: Config>(
        &mut self,
        view: &ModelView<'_>,
        pf: &mut Platform<C>,
        egress: &mut Egress,
        uid: u32,
    ) {
        let frame = UploadFrameHeader {
            update_type: self.update_type,
            total_size: 0,
            file_block_index: CANCEL_BLOCK_INDEX,
            is_last_block: 0,
            block_length: 0,
        };
        if let Ok(total) = compose_command_packet(&mut self.frame_buf, view, uid, 0, &frame, &[]) {
            // Cancel frames are fire-and-forget.
            let _ = egress.send(view, pf, &mut self.frame_buf[..total], LinkHint::Any);
        }
    }
}

impl Default for UploadEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Composes `(PacketHeader, CommandHeader, UploadFrameHeader, payload)` into `buf`.
fn compose_command_packet(
    buf: &mut [u8],
    view: &ModelView<'_>,
    command_counter: u32,
    resend_counter: u8,
    frame: &UploadFrameHeader,
    payload: &[u8],
) -> Result<usize, crate::Error> {
    let total = mem::size_of::<PacketHeader>()
        + mem::size_of::<CommandHeader>()
        + mem::size_of::<UploadFrameHeader>()
        + payload.len();
    let header = PacketHeader {
        crc: 0,
        packet_flags: Module::Commands.into(),
        packet_type: PacketType::Command.into(),
        // Upload blocks travel on the data stream (stream 0); the dispatcher assigns the
        // sequence number.
        stream_packet_idx: 0,
        radio_link_packet_index: 0,
        total_length: total as u16,
        vehicle_id_src: view.controller_id,
        vehicle_id_dest: view.vehicle_id,
    };
    let command = CommandHeader {
        command_type: COMMAND_ID_UPLOAD_SOFTWARE,
        command_counter,
        resend_counter,
    };
    let mut writer = ByteWriter::new(buf);
    writer.write_obj(&header)?;
    writer.write_obj(&command)?;
    writer.write_obj(frame)?;
    writer.write_slice(payload)?;
    Ok(total)
}
