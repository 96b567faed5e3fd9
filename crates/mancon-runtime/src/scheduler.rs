//! [`ThreadScheduler`] – runs programs on a dedicated hardware-owning thread.
//!
//! The scheduler plays the robot's program switcher.  Manual control runs
//! as a [`ManualControlProgram`] on a thread named `mancon-hw`; the idle
//! default program needs no thread.  A foreign program can be simulated to
//! exercise the conflict paths.
//!
//! Every switch is reported to the [`LifecycleMonitor`] the way a real
//! scheduler would report pre-start and post-stop events.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mancon_hal::BusTransport;
use mancon_kernel::{InterruptFlag, LifecycleMonitor, ProgramScheduler, TaskQueue};
use mancon_types::{ControlError, ProgramKind};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::context::HardwareContext;
use crate::program::ManualControlProgram;

pub const HARDWARE_THREAD_NAME: &str = "mancon-hw";

enum Active {
    Default,
    ManualControl {
        interrupt: InterruptFlag,
        thread: JoinHandle<()>,
    },
    Foreign(String),
}

pub struct ThreadScheduler {
    lifecycle: Arc<LifecycleMonitor>,
    queue: Arc<TaskQueue<HardwareContext>>,
    transport: Arc<dyn BusTransport>,
    config: BridgeConfig,
    active: Mutex<Active>,
}

impl ThreadScheduler {
    /// Create a scheduler running the default program.
    pub fn new(
        lifecycle: Arc<LifecycleMonitor>,
        queue: Arc<TaskQueue<HardwareContext>>,
        transport: Arc<dyn BusTransport>,
        config: BridgeConfig,
    ) -> Self {
        lifecycle.on_program_started(&ProgramKind::Default);
        Self {
            lifecycle,
            queue,
            transport,
            config,
            active: Mutex::new(Active::Default),
        }
    }

    /// Name of the running program, for status displays.
    pub fn active_program(&self) -> String {
        match &*self.active.lock() {
            Active::Default => "default".to_string(),
            Active::ManualControl { .. } => "manual-control".to_string(),
            Active::Foreign(name) => name.clone(),
        }
    }

    /// Switch to a foreign program, stopping manual control if it runs.
    pub fn start_foreign_program(&self, name: &str) {
        let mut active = self.active.lock();
        self.stop_manual_control_locked(&mut active);
        if let Active::Foreign(previous) = &*active {
            self.lifecycle.on_program_stopped(&ProgramKind::Other(previous.clone()));
        }
        info!(program = name, "foreign program started");
        *active = Active::Foreign(name.to_string());
        self.lifecycle.on_program_started(&ProgramKind::Other(name.to_string()));
    }

    /// Stop the foreign program, if any, and return to the default program.
    pub fn stop_foreign_program(&self) {
        let mut active = self.active.lock();
        if let Active::Foreign(name) = &*active {
            info!(program = %name, "foreign program stopped");
            self.lifecycle.on_program_stopped(&ProgramKind::Other(name.clone()));
            *active = Active::Default;
            self.lifecycle.on_program_started(&ProgramKind::Default);
        }
    }

    fn stop_manual_control_locked(&self, active: &mut Active) {
        if !matches!(active, Active::ManualControl { .. }) {
            return;
        }
        let Active::ManualControl { interrupt, thread } = std::mem::replace(active, Active::Default)
        else {
            return;
        };

        interrupt.raise();
        let cancelled = self.queue.shutdown();
        info!(cancelled, "stopping manual control program");

        if thread.thread().id() == thread::current().id() {
            warn!("manual control stopped from its own thread; not waiting for it to exit");
        } else if thread.join().is_err() {
            error!("hardware-owning thread panicked");
        }
        self.lifecycle.on_program_started(&ProgramKind::Default);
    }
}

impl ProgramScheduler for ThreadScheduler {
    fn start_manual_control(&self) -> Result<(), ControlError> {
        let mut active = self.active.lock();
        match &*active {
            Active::ManualControl { .. } => return Ok(()),
            Active::Foreign(name) => {
                return Err(ControlError::LifecycleConflict(format!(
                    "program '{name}' owns the robot; stop it before starting manual control"
                )));
            }
            Active::Default => {}
        }

        let interrupt = InterruptFlag::new();
        let program = ManualControlProgram {
            lifecycle: self.lifecycle.clone(),
            queue: self.queue.clone(),
            transport: self.transport.clone(),
            config: self.config.clone(),
            interrupt: interrupt.clone(),
        };
        let thread = thread::Builder::new()
            .name(HARDWARE_THREAD_NAME.to_string())
            .spawn(move || program.run())
            .map_err(|e| ControlError::Internal(format!("failed to spawn hardware thread: {e}")))?;

        info!("manual control program requested");
        *active = Active::ManualControl { interrupt, thread };
        Ok(())
    }

    fn stop_manual_control(&self) {
        let mut active = self.active.lock();
        self.stop_manual_control_locked(&mut active);
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.stop_manual_control();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mancon_hal::sim::SimTransport;
    use mancon_types::{LifecycleState, ModuleDescriptor};
    use std::time::Duration;

    fn scheduler() -> (
        Arc<LifecycleMonitor>,
        Arc<TaskQueue<HardwareContext>>,
        Arc<SimTransport>,
        ThreadScheduler,
    ) {
        let lifecycle = Arc::new(LifecycleMonitor::new(Duration::from_secs(2)));
        let queue = Arc::new(TaskQueue::new());
        let transport = Arc::new(SimTransport::new());
        let scheduler = ThreadScheduler::new(
            lifecycle.clone(),
            queue.clone(),
            transport.clone(),
            BridgeConfig::default(),
        );
        (lifecycle, queue, transport, scheduler)
    }

    #[test]
    fn ownership_runs_work_on_the_hardware_thread() {
        let (lifecycle, queue, _transport, scheduler) = scheduler();
        lifecycle.request_ownership(&scheduler).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::ManualControlOwner);

        let name = queue
            .submit(false, |_ctx: &HardwareContext| {
                Ok(thread::current().name().map(str::to_string))
            })
            .wait()
            .unwrap();
        assert_eq!(name.as_deref(), Some(HARDWARE_THREAD_NAME));

        scheduler.stop_manual_control();
        assert_eq!(lifecycle.state(), LifecycleState::DefaultOwner);
    }

    #[test]
    fn stop_safes_every_module_left_open() {
        let (lifecycle, queue, transport, scheduler) = scheduler();
        lifecycle.request_ownership(&scheduler).unwrap();
        let d = ModuleDescriptor::new("DQ1", 2);
        let opened = d.clone();
        queue
            .submit(false, move |ctx: &HardwareContext| ctx.open_module(&opened))
            .wait()
            .unwrap();

        scheduler.stop_manual_control();
        assert_eq!(transport.module(&d).unwrap().fail_safe_count(), 1);
        assert!(!queue.is_open());
    }

    #[test]
    fn foreign_program_blocks_manual_control() {
        let (lifecycle, _queue, _transport, scheduler) = scheduler();
        scheduler.start_foreign_program("autonomous");
        let err = lifecycle.request_ownership(&scheduler).unwrap_err();
        assert!(matches!(err, ControlError::LifecycleConflict(_)));
        assert_eq!(lifecycle.state(), LifecycleState::OtherOwner);

        scheduler.stop_foreign_program();
        assert_eq!(lifecycle.state(), LifecycleState::DefaultOwner);
        lifecycle.request_ownership(&scheduler).unwrap();
        scheduler.stop_manual_control();
    }

    #[test]
    fn foreign_program_preempts_manual_control() {
        let (lifecycle, _queue, _transport, scheduler) = scheduler();
        lifecycle.request_ownership(&scheduler).unwrap();
        scheduler.start_foreign_program("teleop");
        assert_eq!(lifecycle.state(), LifecycleState::OtherOwner);
        assert_eq!(scheduler.active_program(), "teleop");
    }

    #[test]
    fn stop_is_idempotent() {
        let (lifecycle, _queue, _transport, scheduler) = scheduler();
        scheduler.stop_manual_control();
        lifecycle.request_ownership(&scheduler).unwrap();
        scheduler.stop_manual_control();
        scheduler.stop_manual_control();
        assert_eq!(lifecycle.state(), LifecycleState::DefaultOwner);
    }
}
