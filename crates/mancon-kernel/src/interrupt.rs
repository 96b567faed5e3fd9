//! Per-thread cancellation signal for the hardware-owning thread.
//!
//! Stopping a manual-control session raises the [`InterruptFlag`] of the
//! thread that runs it.  Code running on that thread (the dispatch layer, a
//! bus transport) polls [`is_interrupted`] and abandons its work when the
//! flag is up.
//!
//! Cleanup that must complete even during shutdown, such as putting a module
//! into fail-safe, wraps itself in a [`shield`]: the flag is lowered for the
//! lifetime of the returned guard and restored when it drops.
//!
//! ```
//! use mancon_kernel::interrupt::{self, InterruptFlag};
//!
//! let flag = InterruptFlag::new();
//! let _installed = flag.install();
//! flag.raise();
//! assert!(interrupt::is_interrupted());
//! {
//!     let _shield = interrupt::shield();
//!     assert!(!interrupt::is_interrupted());
//! }
//! assert!(interrupt::is_interrupted());
//! ```

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    static CURRENT: RefCell<Option<InterruptFlag>> = const { RefCell::new(None) };
}

/// Shareable cancellation flag.  Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Lower the flag, returning whether it was raised.
    pub fn clear(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Make this the flag of the calling thread until the guard drops.
    pub fn install(&self) -> InstallGuard {
        let previous = CURRENT.with(|slot| slot.borrow_mut().replace(self.clone()));
        InstallGuard { previous }
    }
}

/// Restores the previously installed flag on drop.
#[must_use = "the flag is uninstalled when the guard drops"]
pub struct InstallGuard {
    previous: Option<InterruptFlag>,
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// `true` when the calling thread has an installed flag and it is raised.
pub fn is_interrupted() -> bool {
    CURRENT.with(|slot| slot.borrow().as_ref().is_some_and(InterruptFlag::is_raised))
}

/// Lower the calling thread's flag until the returned guard drops.
///
/// Threads without an installed flag get an inert guard.
pub fn shield() -> ShieldGuard {
    let flag = CURRENT.with(|slot| slot.borrow().clone());
    let was_raised = flag.as_ref().is_some_and(InterruptFlag::clear);
    ShieldGuard { flag, was_raised }
}

/// Re-raises the shielded flag on drop if it was raised before.
#[must_use = "the shield lifts when the guard drops"]
pub struct ShieldGuard {
    flag: Option<InterruptFlag>,
    was_raised: bool,
}

impl Drop for ShieldGuard {
    fn drop(&mut self) {
        if self.was_raised
            && let Some(flag) = &self.flag
        {
            flag.raise();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn thread_without_flag_is_never_interrupted() {
        assert!(!is_interrupted());
        let _shield = shield();
        assert!(!is_interrupted());
    }

    #[test]
    fn raise_from_another_thread_is_observed() {
        let flag = InterruptFlag::new();
        let _installed = flag.install();

        let remote = flag.clone();
        thread::spawn(move || remote.raise()).join().unwrap();

        assert!(is_interrupted());
    }

    #[test]
    fn shield_restores_a_raised_flag() {
        let flag = InterruptFlag::new();
        let _installed = flag.install();
        flag.raise();

        {
            let _shield = shield();
            assert!(!is_interrupted());
            assert!(!flag.is_raised());
        }

        assert!(flag.is_raised());
    }

    #[test]
    fn shield_leaves_a_lowered_flag_lowered() {
        let flag = InterruptFlag::new();
        let _installed = flag.install();
        drop(shield());
        assert!(!flag.is_raised());
    }

    #[test]
    fn install_guard_uninstalls_on_drop() {
        let flag = InterruptFlag::new();
        flag.raise();
        {
            let _installed = flag.install();
            assert!(is_interrupted());
        }
        assert!(!is_interrupted());
    }
}
