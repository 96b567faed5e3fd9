//! `mancon-kernel` – Safety & Orchestration
//!
//! Hardware-agnostic primitives that decide *who* may touch the bus and
//! *where* that work runs.
//!
//! # Modules
//!
//! - [`lifecycle`] – [`LifecycleMonitor`][lifecycle::LifecycleMonitor]:
//!   tracks which program owns the hardware-owning context and implements the
//!   blocking "become owner" request against a
//!   [`ProgramScheduler`][lifecycle::ProgramScheduler].
//! - [`task_queue`] – [`TaskQueue`][task_queue::TaskQueue]: multi-producer,
//!   single-consumer queue of deferred calls with an urgent lane and
//!   cancel-on-shutdown.
//! - [`client_lock`] – [`ClientLock`][client_lock::ClientLock]: at most one
//!   network client may drive the hardware at a time.
//! - [`interrupt`] – per-thread cancellation flag raised when a session
//!   stops, plus a shield for cleanup that must not be cut short.

pub mod client_lock;
pub mod interrupt;
pub mod lifecycle;
pub mod task_queue;

pub use client_lock::{Acquired, ClientLock};
pub use interrupt::InterruptFlag;
pub use lifecycle::{LifecycleMonitor, ProgramScheduler};
pub use task_queue::{Completion, Job, TaskQueue};
