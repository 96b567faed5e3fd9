//! [`LifecycleMonitor`] – who owns the hardware-owning context.
//!
//! The monitor mirrors the program scheduler's view as a single
//! [`LifecycleState`] guarded by one mutex.  Every transition happens under
//! that mutex and is broadcast on the paired condition variable, so a thread
//! that checked the state and went to sleep cannot miss the change it was
//! waiting for.
//!
//! | Event | New state |
//! |---|---|
//! | ownership requested while the default program runs | `Pending` |
//! | program reports init/start | owner state of that program |
//! | program reports stop | `Pending` (until the next program starts) |
//! | a `Pending` transition outlives the ownership timeout | `DefaultOwner` |

use std::time::{Duration, Instant};

use mancon_types::{ControlError, LifecycleState, ProgramKind};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// The external program scheduler, seen from the manual-control side.
pub trait ProgramScheduler: Send + Sync {
    /// Ask the scheduler to make manual control the active program.
    ///
    /// Returns once the request is accepted; the program reports having
    /// started through [`LifecycleMonitor::on_program_started`].
    fn start_manual_control(&self) -> Result<(), ControlError>;

    /// Ask the scheduler to stop manual control.  A no-op when manual control
    /// is not the active program.
    fn stop_manual_control(&self);
}

/// Four-state lifecycle tracker with broadcast-on-transition.
pub struct LifecycleMonitor {
    state: Mutex<LifecycleState>,
    changed: Condvar,
    pending_timeout: Duration,
}

impl LifecycleMonitor {
    /// Start in [`LifecycleState::DefaultOwner`].
    ///
    /// `pending_timeout` bounds how long any caller waits on a `Pending`
    /// transition before abandoning it.
    pub fn new(pending_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LifecycleState::DefaultOwner),
            changed: Condvar::new(),
            pending_timeout,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Block until manual control owns the hardware context.
    ///
    /// Asks `scheduler` to switch programs whenever the default program is in
    /// charge, then waits for the outcome.  The loop rides out the scheduler
    /// restarting the default program underneath it.
    ///
    /// # Errors
    ///
    /// - [`ControlError::LifecycleConflict`] – another program owns the
    ///   context (state is left untouched), or the switch never resolved.
    /// - Whatever `scheduler` reports when it refuses the switch.
    pub fn request_ownership(&self, scheduler: &dyn ProgramScheduler) -> Result<(), ControlError> {
        let deadline = Instant::now() + self.pending_timeout;
        let mut state = self.state.lock();
        loop {
            match *state {
                LifecycleState::ManualControlOwner => return Ok(()),
                LifecycleState::OtherOwner => {
                    return Err(ControlError::LifecycleConflict(
                        "another program owns the robot; stop it before starting manual control"
                            .to_string(),
                    ));
                }
                LifecycleState::DefaultOwner => {
                    self.transition(&mut state, LifecycleState::Pending);
                    let requested =
                        MutexGuard::unlocked(&mut state, || scheduler.start_manual_control());
                    if let Err(err) = requested {
                        if *state == LifecycleState::Pending {
                            self.transition(&mut state, LifecycleState::DefaultOwner);
                        }
                        return Err(err);
                    }
                }
                LifecycleState::Pending => {
                    if self.changed.wait_until(&mut state, deadline).timed_out()
                        && *state == LifecycleState::Pending
                    {
                        warn!("program switch did not resolve in time; abandoning it");
                        self.transition(&mut state, LifecycleState::DefaultOwner);
                        return Err(ControlError::LifecycleConflict(
                            "timed out waiting for manual control to start".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// `true` when manual control owns the context.
    ///
    /// Waits out an in-flight `Pending` transition (bounded by the ownership
    /// timeout) so callers never act on a half-finished switch.
    pub fn is_manual_control_active(&self) -> bool {
        let deadline = Instant::now() + self.pending_timeout;
        let mut state = self.state.lock();
        while *state == LifecycleState::Pending {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state == LifecycleState::ManualControlOwner
    }

    /// Scheduler notification: `program` is initialising or has started.
    pub fn on_program_started(&self, program: &ProgramKind) {
        let mut state = self.state.lock();
        self.transition(&mut state, program.owner_state());
    }

    /// Scheduler notification: `program` has stopped.
    ///
    /// The context is `Pending` until the scheduler reports the next program.
    pub fn on_program_stopped(&self, program: &ProgramKind) {
        let mut state = self.state.lock();
        if *state == program.owner_state() {
            self.transition(&mut state, LifecycleState::Pending);
        } else {
            debug!(
                ?program,
                current = ?*state,
                "stop report for a program that no longer owns the context"
            );
        }
    }

    fn transition(&self, state: &mut MutexGuard<'_, LifecycleState>, next: LifecycleState) {
        if **state != next {
            info!(from = ?**state, to = ?next, "hardware ownership transition");
            **state = next;
        }
        self.changed.notify_all();
    }
}
