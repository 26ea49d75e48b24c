//! Stack configuration trait.

use crate::{
    driver::RadioDriver,
    event::EventSink,
    link::pacer::SlowLinkAdmission,
    time::Timer,
    upload::{ArchiveSource, CommandInbox, UploadUi},
};

/// Trait for stack configurations.
///
/// This trait defines the platform service types used throughout the stack: the clock, the radio
/// driver, the event channels, and the collaborators of the upload engine.
///
/// Every application must define a type implementing this trait and supply it to the stack.
pub trait Config {
    /// A time source with microsecond resolution.
    type Timer: Timer;

    /// The radio packet driver (802.11 injection and serial writes).
    type Driver: RadioDriver;

    /// Sink for alarms and router control messages.
    type Events: EventSink;

    /// Admission policy for bandwidth-constrained serial links.
    type Admission: SlowLinkAdmission;

    /// Inbound command responses (ACKs) from the vehicle.
    type Inbox: CommandInbox;

    /// Operator-facing surface of the upload engine.
    type Ui: UploadUi;

    /// Provider of the firmware archive to upload.
    type Archive: ArchiveSource;
}

/// Bundles the platform service instances of a [`Config`].
///
/// The stack takes `&mut Platform<C>` instead of seven separate arguments. The application
/// constructs this once at startup and keeps it alive for the process lifetime.
pub struct Platform<C: Config> {
    pub timer: C::Timer,
    pub driver: C::Driver,
    pub events: C::Events,
    pub admission: C::Admission,
    pub inbox: C::Inbox,
    pub ui: C::Ui,
    pub archive: C::Archive,
}
