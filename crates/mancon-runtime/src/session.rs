//! [`ManualControlSession`] – request-thread side of the hardware hand-off.

use std::sync::Arc;
use std::time::Duration;

use mancon_kernel::{Completion, LifecycleMonitor, TaskQueue};
use mancon_types::ControlError;

use crate::context::HardwareContext;

/// Runs closures on the hardware-owning thread on behalf of request threads.
///
/// Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct ManualControlSession {
    lifecycle: Arc<LifecycleMonitor>,
    queue: Arc<TaskQueue<HardwareContext>>,
}

impl ManualControlSession {
    pub fn new(lifecycle: Arc<LifecycleMonitor>, queue: Arc<TaskQueue<HardwareContext>>) -> Self {
        Self { lifecycle, queue }
    }

    /// Run `work` on the hardware-owning thread and wait for its result.
    ///
    /// # Errors
    ///
    /// - [`ControlError::LifecycleConflict`] – manual control is not running;
    ///   nothing was queued.
    /// - [`ControlError::SessionEnded`] – the session stopped before `work`
    ///   could run.
    /// - Whatever `work` itself returns.
    pub fn run<T, F>(&self, must_run_next: bool, work: F) -> Result<T, ControlError>
    where
        F: FnOnce(&HardwareContext) -> Result<T, ControlError> + Send + 'static,
        T: Send + 'static,
    {
        if !self.lifecycle.is_manual_control_active() {
            return Err(ControlError::LifecycleConflict(
                "manual control is not running; send start first".to_string(),
            ));
        }
        self.queue.submit(must_run_next, work).wait()
    }

    /// Like [`run`][Self::run] but never blocks on a pending program switch
    /// and gives up waiting after `timeout`.
    pub fn query<T, F>(&self, timeout: Duration, work: F) -> Result<T, ControlError>
    where
        F: FnOnce(&HardwareContext) -> Result<T, ControlError> + Send + 'static,
        T: Send + 'static,
    {
        let pending: Completion<T> = self.queue.submit(true, work);
        pending.wait_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mancon_types::ProgramKind;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn open_session() -> (
        Arc<LifecycleMonitor>,
        Arc<TaskQueue<HardwareContext>>,
        ManualControlSession,
    ) {
        let lifecycle = Arc::new(LifecycleMonitor::new(Duration::from_millis(50)));
        let queue = Arc::new(TaskQueue::new());
        queue.open();
        let session = ManualControlSession::new(lifecycle.clone(), queue.clone());
        (lifecycle, queue, session)
    }

    fn assert_refused_without_queueing(
        session: &ManualControlSession,
        queue: &TaskQueue<HardwareContext>,
    ) {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let err = session
            .run(false, move |_ctx| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ControlError::LifecycleConflict(_)), "{err}");
        assert!(queue.is_empty());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn run_is_refused_while_the_default_program_owns_the_robot() {
        let (lifecycle, queue, session) = open_session();
        assert_eq!(lifecycle.state(), mancon_types::LifecycleState::DefaultOwner);
        assert_refused_without_queueing(&session, &queue);
    }

    #[test]
    fn run_is_refused_while_a_foreign_program_owns_the_robot() {
        let (lifecycle, queue, session) = open_session();
        lifecycle.on_program_started(&ProgramKind::Other("autonomous".into()));
        assert_refused_without_queueing(&session, &queue);
    }
}
