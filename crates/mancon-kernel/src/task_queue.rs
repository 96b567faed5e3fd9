//! [`TaskQueue`] – hands work from request threads to the hardware-owning
//! thread.
//!
//! Any thread may [`submit`][TaskQueue::submit] a closure; exactly one
//! consumer thread runs them, one at a time, through
//! [`run`][TaskQueue::run].  Every submission yields a [`Completion`] the
//! caller blocks on for the closure's result.
//!
//! # Ordering
//!
//! Items submitted with `must_run_next` go to an urgent lane that is always
//! drained before the normal lane.  Within a lane items run in submission
//! order.
//!
//! # Shutdown
//!
//! [`shutdown`][TaskQueue::shutdown] stops the queue from accepting work and
//! cancels everything still queued.  A cancelled item never runs; its caller
//! observes [`ControlError::SessionEnded`].  Items submitted after shutdown
//! are cancelled on the spot.
//!
//! ```
//! use mancon_kernel::TaskQueue;
//!
//! let queue: TaskQueue<u32> = TaskQueue::new();
//! queue.open();
//! let done = queue.submit(false, |ctx: &u32| Ok(*ctx + 1));
//! assert!(queue.run_next(&41));
//! assert_eq!(done.wait().unwrap(), 42);
//! ```

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use mancon_types::ControlError;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

/// A deferred call plus the means to report its outcome.
///
/// `C` is the context the consumer lends to every call it runs.
pub trait Job<C>: Send {
    fn run(self: Box<Self>, ctx: &C);
    fn cancel(self: Box<Self>);
}

struct Call<F, T> {
    work: F,
    reply: Sender<Result<T, ControlError>>,
}

impl<C, F, T> Job<C> for Call<F, T>
where
    F: FnOnce(&C) -> Result<T, ControlError> + Send,
    T: Send,
{
    fn run(self: Box<Self>, ctx: &C) {
        let Call { work, reply } = *self;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(ctx))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "queued manual-control task panicked");
            Err(ControlError::Internal(message))
        });
        // The caller may have stopped waiting; that is not our concern.
        let _ = reply.send(outcome);
    }

    fn cancel(self: Box<Self>) {
        let _ = self.reply.send(Err(ControlError::SessionEnded(
            "request cancelled before it ran".to_string(),
        )));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Result token for one submitted item.
#[must_use = "dropping a Completion discards the result of the submitted work"]
pub struct Completion<T> {
    rx: Receiver<Result<T, ControlError>>,
}

impl<T> Completion<T> {
    /// Block until the item ran or was cancelled.
    pub fn wait(self) -> Result<T, ControlError> {
        self.rx.recv().unwrap_or_else(|_| Err(consumer_gone()))
    }

    /// Like [`wait`][Self::wait] but gives up after `timeout`; the item
    /// itself still runs or is cancelled as usual.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, ControlError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(ControlError::NotResponding {
                module: "manual-control task queue".to_string(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(consumer_gone()),
        }
    }
}

fn consumer_gone() -> ControlError {
    ControlError::SessionEnded(
        "hardware-owning thread stopped while the request was in flight".into(),
    )
}

struct Lanes<C> {
    urgent: VecDeque<Box<dyn Job<C>>>,
    normal: VecDeque<Box<dyn Job<C>>>,
    accepting: bool,
}

impl<C> Lanes<C> {
    fn pop(&mut self) -> Option<Box<dyn Job<C>>> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }
}

/// Multi-producer, single-consumer queue of deferred calls with an urgent
/// lane.
pub struct TaskQueue<C> {
    lanes: Mutex<Lanes<C>>,
    available: Condvar,
}

impl<C> Default for TaskQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TaskQueue<C> {
    /// Create a closed queue.  Call [`open`][Self::open] before submitting.
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                urgent: VecDeque::new(),
                normal: VecDeque::new(),
                accepting: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Start accepting work for a new consumer run.
    pub fn open(&self) {
        self.lanes.lock().accepting = true;
    }

    pub fn is_open(&self) -> bool {
        self.lanes.lock().accepting
    }

    /// Number of items waiting to run.
    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.urgent.len() + lanes.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `work` for the consumer.
    ///
    /// With `must_run_next` the item overtakes every queued normal item.  A
    /// closed queue cancels the item immediately.
    pub fn submit<T, F>(&self, must_run_next: bool, work: F) -> Completion<T>
    where
        F: FnOnce(&C) -> Result<T, ControlError> + Send + 'static,
        T: Send + 'static,
        C: 'static,
    {
        let (reply, rx) = crossbeam_channel::bounded(1);
        let job: Box<dyn Job<C>> = Box::new(Call { work, reply });

        let mut lanes = self.lanes.lock();
        if !lanes.accepting {
            drop(lanes);
            debug!("task submitted to a closed queue; cancelling");
            job.cancel();
            return Completion { rx };
        }
        if must_run_next {
            lanes.urgent.push_back(job);
        } else {
            lanes.normal.push_back(job);
        }
        drop(lanes);
        self.available.notify_one();
        Completion { rx }
    }

    /// Block until an item is available and run it on the calling thread.
    ///
    /// Returns `false` once the queue is shut down and nothing is left.
    pub fn run_next(&self, ctx: &C) -> bool {
        let job = {
            let mut lanes = self.lanes.lock();
            loop {
                if let Some(job) = lanes.pop() {
                    break job;
                }
                if !lanes.accepting {
                    return false;
                }
                self.available.wait(&mut lanes);
            }
        };
        job.run(ctx);
        true
    }

    /// Consumer loop: run items until the queue shuts down.
    pub fn run(&self, ctx: &C) {
        while self.run_next(ctx) {}
    }

    /// Stop accepting work and cancel everything still queued.
    ///
    /// Returns the number of cancelled items.  Idempotent.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Box<dyn Job<C>>> = {
            let mut lanes = self.lanes.lock();
            lanes.accepting = false;
            let mut drained: Vec<_> = lanes.urgent.drain(..).collect();
            drained.extend(lanes.normal.drain(..));
            drained
        };
        self.available.notify_all();

        let cancelled = drained.len();
        for job in drained {
            job.cancel();
        }
        if cancelled > 0 {
            debug!(cancelled, "cancelled queued manual-control tasks");
        }
        cancelled
    }
}

impl<C> Drop for TaskQueue<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
