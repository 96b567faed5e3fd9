//! [`HandleTable`] – the client-visible ids of open module connections.
//!
//! Ids are allocated monotonically from zero and never reused within one
//! table, i.e. within one manual-control session.  The table is mutated only
//! on the hardware-owning thread; lookups may come from anywhere.
//!
//! Several ids may wrap the same physical module.  Closing an id fail-safes
//! the module only when no other id still wraps it, so one client handle
//! cannot pull the rug from under another.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mancon_kernel::interrupt;
use mancon_types::{ControlError, HandleId, ModuleDescriptor};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::handle::ModuleHandle;
use crate::transport::{BusFault, BusTransport, ModuleId};

struct Entries {
    handles: BTreeMap<HandleId, Arc<ModuleHandle>>,
    next_id: HandleId,
}

/// Map from [`HandleId`] to [`ModuleHandle`].
pub struct HandleTable {
    entries: Mutex<Entries>,
    cleanup_timeout: Duration,
}

impl HandleTable {
    /// `cleanup_timeout` bounds the fail-safe performed when the last handle
    /// to a module closes.
    pub fn new(cleanup_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries {
                handles: BTreeMap::new(),
                next_id: 0,
            }),
            cleanup_timeout,
        }
    }

    /// Open a fresh connection to `descriptor` and register it.
    ///
    /// Always opens a new connection, even when the module is already open
    /// under another id.  The connection must answer a ping within
    /// `open_timeout`; if it does not it is closed again and the fault is
    /// returned.
    pub fn open(
        &self,
        transport: &dyn BusTransport,
        descriptor: &ModuleDescriptor,
        open_timeout: Duration,
    ) -> Result<HandleId, BusFault> {
        let handle = ModuleHandle::new(transport.open(descriptor)?);
        if let Err(fault) = handle.ping(open_timeout) {
            warn!(module = %descriptor, error = %fault, "module never became operable; closing");
            handle.close();
            return Err(fault);
        }

        let mut entries = self.entries.lock();
        let id = entries.next_id;
        entries.next_id += 1;
        entries.handles.insert(id, Arc::new(handle));
        info!(handle = id, module = %descriptor, "module handle opened");
        Ok(id)
    }

    pub fn lookup(&self, id: HandleId) -> Result<Arc<ModuleHandle>, ControlError> {
        self.entries
            .lock()
            .handles
            .get(&id)
            .cloned()
            .ok_or(ControlError::UnknownHandle(id))
    }

    /// Close `id`.  Unknown or already-closed ids are a no-op.
    ///
    /// Returns `true` when an entry was removed.
    pub fn close(&self, id: HandleId) -> bool {
        let (handle, still_referenced) = {
            let mut entries = self.entries.lock();
            let Some(handle) = entries.handles.remove(&id) else {
                return false;
            };
            let still_referenced = entries.handles.values().any(|h| h.wraps_same_module(&handle));
            (handle, still_referenced)
        };
        self.release(id, &handle, still_referenced);
        true
    }

    /// Close every entry through the same path as [`close`][Self::close].
    pub fn close_all(&self) -> usize {
        let drained: Vec<(HandleId, Arc<ModuleHandle>)> = {
            let mut entries = self.entries.lock();
            std::mem::take(&mut entries.handles).into_iter().collect()
        };
        let count = drained.len();
        for (i, (id, handle)) in drained.iter().enumerate() {
            let still_referenced = drained[i + 1..]
                .iter()
                .any(|(_, h)| h.wraps_same_module(handle));
            self.release(*id, handle, still_referenced);
        }
        if count > 0 {
            info!(count, "closed all module handles");
        }
        count
    }

    /// Ids currently wrapping `module`, in ascending order.
    pub fn handles_for(&self, module: ModuleId) -> Vec<HandleId> {
        self.entries
            .lock()
            .handles
            .iter()
            .filter(|(_, h)| h.module_id() == module)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: HandleId, handle: &ModuleHandle, still_referenced: bool) {
        // Cleanup must finish even when a session shutdown is what got us here.
        let _shield = interrupt::shield();
        if !still_referenced {
            if let Err(fault) = handle.make_safe(self.cleanup_timeout) {
                warn!(
                    handle = id,
                    module = %handle.descriptor(),
                    error = %fault,
                    "fail-safe on close failed"
                );
            }
        }
        handle.close();
        info!(handle = id, fail_safed = !still_referenced, "module handle closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTransport;
    use mancon_kernel::InterruptFlag;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn table() -> HandleTable {
        HandleTable::new(TIMEOUT)
    }

    #[test]
    fn ids_are_monotonic_and_lookup_round_trips() {
        let transport = SimTransport::new();
        let table = table();
        let d = ModuleDescriptor::new("DQ1", 2);

        let first = table.open(&transport, &d, TIMEOUT).unwrap();
        let second = table.open(&transport, &d, TIMEOUT).unwrap();
        assert_eq!((first, second), (0, 1));
        assert_eq!(table.lookup(first).unwrap().descriptor(), d);

        table.close(first);
        let third = table.open(&transport, &d, TIMEOUT).unwrap();
        assert_eq!(third, 2, "ids are never reused");
    }

    #[test]
    fn lookup_of_unknown_id_is_a_distinct_error() {
        assert_eq!(table().lookup(9).unwrap_err(), ControlError::UnknownHandle(9));
    }

    #[test]
    fn module_is_safed_only_when_last_handle_closes() {
        let transport = SimTransport::new();
        let table = table();
        let d = ModuleDescriptor::new("DQ1", 2);
        let a = table.open(&transport, &d, TIMEOUT).unwrap();
        let b = table.open(&transport, &d, TIMEOUT).unwrap();
        let module = transport.module(&d).unwrap();

        assert!(table.close(a));
        assert_eq!(module.fail_safe_count(), 0);
        assert!(table.lookup(b).is_ok());

        assert!(table.close(b));
        assert_eq!(module.fail_safe_count(), 1);
        assert_eq!(module.idle_pattern_restores(), 1);
        assert_eq!(module.open_connections(), 0);
    }

    #[test]
    fn close_is_idempotent_and_never_double_safes() {
        let transport = SimTransport::new();
        let table = table();
        let d = ModuleDescriptor::new("DQ1", 2);
        let id = table.open(&transport, &d, TIMEOUT).unwrap();

        assert!(table.close(id));
        assert!(!table.close(id));
        assert_eq!(transport.module(&d).unwrap().fail_safe_count(), 1);
    }

    #[test]
    fn close_all_safes_each_module_once() {
        let transport = SimTransport::new();
        let table = table();
        let d1 = ModuleDescriptor::new("DQ1", 2);
        let d2 = ModuleDescriptor::chained("DQ1", 2, 3);
        let first = table.open(&transport, &d1, TIMEOUT).unwrap();
        table.open(&transport, &d1, TIMEOUT).unwrap();
        table.open(&transport, &d2, TIMEOUT).unwrap();

        assert_eq!(table.close_all(), 3);
        assert!(table.is_empty());
        assert_eq!(transport.module(&d1).unwrap().fail_safe_count(), 1);
        assert_eq!(transport.module(&d2).unwrap().fail_safe_count(), 1);

        assert!(!table.close(first), "ids removed by teardown close as no-ops");
        assert_eq!(transport.module(&d1).unwrap().fail_safe_count(), 1);
    }

    #[test]
    fn inoperable_module_is_closed_before_error_surfaces() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 4);
        transport.add_module(&d).set_operable(false);
        let table = table();

        assert_eq!(table.open(&transport, &d, TIMEOUT), Err(BusFault::Timeout));
        assert!(table.is_empty());
        assert_eq!(transport.module(&d).unwrap().open_connections(), 0);
    }

    #[test]
    fn handles_for_lists_every_id_of_a_module() {
        let transport = SimTransport::new();
        let table = table();
        let d = ModuleDescriptor::new("DQ1", 2);
        table.open(&transport, &ModuleDescriptor::new("DQ1", 3), TIMEOUT).unwrap();
        let a = table.open(&transport, &d, TIMEOUT).unwrap();
        let b = table.open(&transport, &d, TIMEOUT).unwrap();

        let module = table.lookup(a).unwrap().module_id();
        assert_eq!(table.handles_for(module), vec![a, b]);
    }

    #[test]
    fn close_completes_fail_safe_despite_pending_interrupt() {
        let transport = SimTransport::new();
        let table = table();
        let d = ModuleDescriptor::new("DQ1", 2);
        let id = table.open(&transport, &d, TIMEOUT).unwrap();

        let flag = InterruptFlag::new();
        let _installed = flag.install();
        flag.raise();

        assert!(table.close(id));
        assert_eq!(transport.module(&d).unwrap().fail_safe_count(), 1);
        assert!(flag.is_raised(), "interrupt is restored after cleanup");
    }
}
