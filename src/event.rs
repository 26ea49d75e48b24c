//! Outbound eventing towards the central process and the router.

/// Alarm kinds raised by the egress core.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AlarmKind {
    /// A serial interface is being driven above its airtime budget.
    ///
    /// Payload: `(tx_bytes_per_sec & 0xFF_FFFF) | (interface_index << 24)`. Aux: the interface's
    /// air baudrate in bytes per second.
    RadioLinkDataOverload,

    /// No TX interface could be assigned to a local radio link.
    ///
    /// Payload: the local radio link id.
    NoTxInterface,
}

/// Control messages sent to the local router process.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RouterControl {
    /// A firmware upload to the vehicle has started.
    UpdateStarted,

    /// The firmware upload has finished, failed, or was canceled.
    UpdateStopped,
}

/// Sink for alarms and router control messages.
///
/// Implementations typically forward these over the local IPC channel to the central process.
/// Both calls must be cheap and non-blocking; the egress core invokes them from the hot path.
pub trait EventSink {
    /// Sends an alarm to the central process.
    fn send_alarm(&mut self, kind: AlarmKind, payload: u32, aux: u32);

    /// Sends a control message to the router.
    fn send_router_control(&mut self, msg: RouterControl);
}
