//! The manual-control program: the consumer side of the task queue.

use std::sync::Arc;

use mancon_hal::BusTransport;
use mancon_kernel::{InterruptFlag, LifecycleMonitor, TaskQueue};
use mancon_types::ProgramKind;
use tracing::info;

use crate::config::BridgeConfig;
use crate::context::HardwareContext;

/// Everything the hardware-owning thread needs for one session.
pub struct ManualControlProgram {
    pub lifecycle: Arc<LifecycleMonitor>,
    pub queue: Arc<TaskQueue<HardwareContext>>,
    pub transport: Arc<dyn BusTransport>,
    pub config: BridgeConfig,
    pub interrupt: InterruptFlag,
}

impl ManualControlProgram {
    /// Run the session on the calling thread until the queue shuts down.
    ///
    /// Every handle still open at the end is fail-safed before the program
    /// reports having stopped.
    pub fn run(self) {
        let _installed = self.interrupt.install();
        let ctx = HardwareContext::new(self.transport, self.config);

        self.queue.open();
        // A stop that raced ahead of `open` must still end this run.
        if self.interrupt.is_raised() {
            self.queue.shutdown();
        }
        self.lifecycle.on_program_started(&ProgramKind::ManualControl);
        info!("manual control program running");

        self.queue.run(&ctx);

        let closed = ctx.teardown();
        info!(closed, "manual control program stopped");
        self.lifecycle.on_program_stopped(&ProgramKind::ManualControl);
    }
}
