//! The radio uplink stack of a long-range FPV ground station.
//!
//! A controller talks to its vehicle over one or more *radio links*, each backed by one or more
//! physical interfaces: high-rate 802.11-class adapters driven through packet injection, and
//! low-rate SiK serial modems. This crate implements the controller-side egress path: for every
//! outbound packet it picks the TX interface per link, plans the uplink modulation/datarate,
//! stamps the radio envelope (sequence numbers, link packet indices, checksum, optional
//! encryption bit), paces the serial links, and aggregates the result. On top of that sits a
//! chunked, selectively-acknowledged upload protocol used for over-the-air firmware transfer.
//!
//! # Using the stack
//!
//! The crate is runtime and hardware-agnostic: it does not need an OS (although you can certainly
//! use one) and provides hardware interfaces that need to be implemented once for every supported
//! platform. The only parts that touch platform services are collected in [`Config`]:
//! * A microsecond-precision [`Timer`].
//! * A [`RadioDriver`] that can inject 802.11 frames and write to serial radios.
//! * An [`EventSink`] for alarms and router control messages.
//! * The upload engine's collaborators: a [`CommandInbox`] for vehicle ACKs, an
//!   [`ArchiveSource`] producing the firmware archive, and an [`UploadUi`].
//!
//! The main loop owns an [`Egress`] dispatcher and calls [`Egress::send`] with composed packet
//! buffers; long-running operations like the firmware upload are cooperative state machines that
//! report when they want to be polled again.
//!
//! [`Config`]: config/trait.Config.html
//! [`Timer`]: time/trait.Timer.html
//! [`RadioDriver`]: driver/trait.RadioDriver.html
//! [`EventSink`]: event/trait.EventSink.html
//! [`CommandInbox`]: upload/trait.CommandInbox.html
//! [`ArchiveSource`]: upload/trait.ArchiveSource.html
//! [`UploadUi`]: upload/trait.UploadUi.html
//! [`Egress`]: link/egress/struct.Egress.html
//! [`Egress::send`]: link/egress/struct.Egress.html#method.send

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
mod log;
#[macro_use]
mod utils;

pub mod bytes;
pub mod config;
mod crc;
pub mod driver;
mod error;
pub mod event;
pub mod link;
pub mod time;
pub mod upload;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::error::Error;
