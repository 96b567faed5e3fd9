//! The bus transport seam.
//!
//! A [`BusTransport`] opens [`ModuleConnection`]s; a connection issues one
//! synchronous [`BusCommand`] at a time and answers with a [`BusResponse`] or
//! a [`BusFault`].  Whatever a transport notices outside a command, such as a
//! module resetting or moving to a new address, goes to the
//! [`ModuleEventSink`] registered with it.
//!
//! Real transports speak the wire protocol; the rest of the workspace only
//! ever talks to these traits, so the simulated transport in
//! [`sim`][crate::sim] can stand in for hardware.

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use mancon_types::ModuleDescriptor;
use mancon_types::bus::{BusCommand, BusResponse, FaultCode, Orientation};
use thiserror::Error;

/// Identity of one physical module as seen by the transport.
///
/// Two connections to the same module report the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Low-level failure reported by the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusFault {
    /// The module answered with a NACK.
    #[error("module NACK {0}")]
    Nack(FaultCode),

    /// No answer before the deadline.
    #[error("module did not answer in time")]
    Timeout,

    /// The module or its bus went away.
    #[error("module disconnected: {0}")]
    Disconnected(String),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// The calling thread's interrupt flag was raised.
    #[error("interrupted")]
    Interrupted,
}

/// Something the transport noticed about a module on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEvent {
    /// The module reset or its status flags changed.
    StatusChanged,
    /// The module now answers at a different address.
    AddressChanged { new_address: u8 },
}

/// Receives [`ModuleEvent`]s from a transport.
///
/// Called on whichever thread noticed the event, never on the thread
/// currently issuing commands to the module.
pub trait ModuleEventSink: Send + Sync {
    fn on_module_event(&self, module: ModuleId, event: ModuleEvent);
}

/// Opens connections to modules on the bus.
pub trait BusTransport: Send + Sync {
    /// Open a new, independent connection to the module at `descriptor`.
    ///
    /// Opening the same module twice yields two connections reporting the
    /// same [`ModuleId`].
    fn open(&self, descriptor: &ModuleDescriptor) -> Result<Box<dyn ModuleConnection>, BusFault>;

    /// The IMU embedded in the controller, if the platform has one.
    fn imu(&self) -> Result<Box<dyn Imu>, BusFault>;

    /// Route module events to `sink`, replacing any previous sink.  Events
    /// are dropped once the sink is gone.
    fn set_event_sink(&self, _sink: Weak<dyn ModuleEventSink>) {}
}

/// One open connection to one module.
///
/// Every method that talks to the module is bounded by `timeout`.
pub trait ModuleConnection: Send + Sync {
    fn module_id(&self) -> ModuleId;

    /// Current address of the module; reflects address changes.
    fn descriptor(&self) -> ModuleDescriptor;

    /// Check that the module is up and accepting commands.
    fn ping(&self, timeout: Duration) -> Result<(), BusFault>;

    fn send(&self, command: &BusCommand, timeout: Duration) -> Result<BusResponse, BusFault>;

    /// Drive every output of the module to its safe state.
    fn fail_safe(&self, timeout: Duration) -> Result<(), BusFault>;

    /// Put the status LED back to the module's idle pattern.
    fn restore_idle_pattern(&self, timeout: Duration) -> Result<(), BusFault>;

    /// Release this connection.  Must be safe to call more than once.
    fn close(&self);
}

/// The embedded inertial measurement unit.
pub trait Imu: Send + Sync {
    fn initialize(&self, timeout: Duration) -> Result<(), BusFault>;

    fn orientation(&self, timeout: Duration) -> Result<Orientation, BusFault>;
}
