//! [`HardwareContext`] – state lent to every task run on the hardware-owning
//! thread.
//!
//! One context lives for exactly one manual-control session.  Only the
//! consumer of the task queue ever sees it, so its handle table is mutated
//! from a single thread.

use std::sync::Arc;
use std::time::Duration;

use mancon_hal::{BusFault, BusTransport, HandleTable, Imu};
use mancon_kernel::interrupt;
use mancon_types::{ControlError, HandleId, ModuleDescriptor};
use parking_lot::Mutex;
use tracing::info;

use crate::config::BridgeConfig;
use crate::dispatch::translate_fault;

const IMU_NAME: &str = "imu";

pub struct HardwareContext {
    transport: Arc<dyn BusTransport>,
    handles: HandleTable,
    imu: Mutex<Option<Box<dyn Imu>>>,
    config: BridgeConfig,
}

impl HardwareContext {
    pub fn new(transport: Arc<dyn BusTransport>, config: BridgeConfig) -> Self {
        Self {
            transport,
            handles: HandleTable::new(config.cleanup_timeout()),
            imu: Mutex::new(None),
            config,
        }
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn device_timeout(&self) -> Duration {
        self.config.device_timeout()
    }

    /// Open a new handle to `descriptor`.
    pub fn open_module(&self, descriptor: &ModuleDescriptor) -> Result<HandleId, ControlError> {
        self.handles
            .open(self.transport.as_ref(), descriptor, self.config.open_timeout())
            .map_err(|fault| translate_fault(&descriptor.to_string(), fault))
    }

    /// Initialise the embedded IMU.  Re-initialising replaces the previous
    /// instance.
    pub fn init_imu(&self) -> Result<(), ControlError> {
        let imu = self
            .transport
            .imu()
            .map_err(|fault| translate_fault(IMU_NAME, fault))?;
        imu.initialize(self.config.open_timeout())
            .map_err(|fault| translate_fault(IMU_NAME, fault))?;
        *self.imu.lock() = Some(imu);
        info!("IMU initialised");
        Ok(())
    }

    /// Run `op` against the initialised IMU.
    pub fn with_imu<T>(
        &self,
        op: impl FnOnce(&dyn Imu, Duration) -> Result<T, BusFault>,
    ) -> Result<T, ControlError> {
        let imu = self.imu.lock();
        let Some(imu) = imu.as_deref() else {
            return Err(ControlError::LifecycleConflict(
                "the IMU has not been initialised; send initImu first".to_string(),
            ));
        };
        op(imu, self.device_timeout()).map_err(|fault| translate_fault(IMU_NAME, fault))
    }

    /// Close every handle, fail-safing each module once.
    pub fn teardown(&self) -> usize {
        let _shield = interrupt::shield();
        self.imu.lock().take();
        self.handles.close_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mancon_hal::sim::SimTransport;

    fn context() -> (Arc<SimTransport>, HardwareContext) {
        let transport = Arc::new(SimTransport::new());
        let ctx = HardwareContext::new(transport.clone(), BridgeConfig::default());
        (transport, ctx)
    }

    #[test]
    fn open_failure_is_translated() {
        let (transport, ctx) = context();
        let d = ModuleDescriptor::new("DQ1", 9);
        transport.add_module(&d).set_operable(false);
        assert!(matches!(
            ctx.open_module(&d),
            Err(ControlError::NotResponding { .. })
        ));
    }

    #[test]
    fn imu_must_be_initialised_before_use() {
        let (_transport, ctx) = context();
        let err = ctx.with_imu(|imu, t| imu.orientation(t)).unwrap_err();
        assert!(matches!(err, ControlError::LifecycleConflict(_)));

        ctx.init_imu().unwrap();
        assert!(ctx.with_imu(|imu, t| imu.orientation(t)).is_ok());
    }

    #[test]
    fn teardown_safes_every_open_module() {
        let (transport, ctx) = context();
        let d = ModuleDescriptor::new("DQ1", 2);
        ctx.open_module(&d).unwrap();
        ctx.open_module(&d).unwrap();

        assert_eq!(ctx.teardown(), 2);
        assert_eq!(transport.module(&d).unwrap().fail_safe_count(), 1);
    }
}
