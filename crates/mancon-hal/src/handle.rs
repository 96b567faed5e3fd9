//! [`ModuleHandle`] – one open connection to one module.

use std::fmt;
use std::time::{Duration, Instant};

use mancon_types::ModuleDescriptor;
use mancon_types::bus::{BusCommand, BusResponse};
use parking_lot::Mutex;

use crate::transport::{BusFault, ModuleConnection, ModuleId};

/// Wraps a [`ModuleConnection`] with an idempotent close.
///
/// Handles compare equal when they wrap the same physical module, even if
/// they are distinct connections.
pub struct ModuleHandle {
    connection: Box<dyn ModuleConnection>,
    closed: Mutex<bool>,
}

impl ModuleHandle {
    pub fn new(connection: Box<dyn ModuleConnection>) -> Self {
        Self {
            connection,
            closed: Mutex::new(false),
        }
    }

    pub fn module_id(&self) -> ModuleId {
        self.connection.module_id()
    }

    pub fn descriptor(&self) -> ModuleDescriptor {
        self.connection.descriptor()
    }

    pub fn wraps_same_module(&self, other: &ModuleHandle) -> bool {
        self.module_id() == other.module_id()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    pub fn ping(&self, timeout: Duration) -> Result<(), BusFault> {
        self.ensure_open()?;
        self.connection.ping(timeout)
    }

    /// Send `command`, failing with [`BusFault::Closed`] after close.
    pub fn send(&self, command: &BusCommand, timeout: Duration) -> Result<BusResponse, BusFault> {
        self.ensure_open()?;
        self.connection.send(command, timeout)
    }

    /// Fail-safe the module and restore its idle LED pattern.
    ///
    /// `timeout` bounds both steps together; the idle-pattern restore only
    /// gets what the fail-safe left over.  Both steps are attempted even if
    /// the first one faults; the first fault is returned.
    pub fn make_safe(&self, timeout: Duration) -> Result<(), BusFault> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;
        let safed = self.connection.fail_safe(timeout);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let idle = self.connection.restore_idle_pattern(remaining);
        safed.and(idle)
    }

    /// Release the connection.  Returns `true` only for the call that
    /// actually closed it.
    pub fn close(&self) -> bool {
        let mut closed = self.closed.lock();
        if *closed {
            return false;
        }
        *closed = true;
        self.connection.close();
        true
    }

    fn ensure_open(&self) -> Result<(), BusFault> {
        if self.is_closed() {
            Err(BusFault::Closed)
        } else {
            Ok(())
        }
    }
}

impl PartialEq for ModuleHandle {
    fn eq(&self, other: &Self) -> bool {
        self.wraps_same_module(other)
    }
}

impl Eq for ModuleHandle {}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("module", &self.module_id())
            .field("descriptor", &self.descriptor())
            .field("closed", &self.is_closed())
            .finish()
    }
}
