//! [`ClientLock`] – at most one network client drives the hardware.
//!
//! The first local, subscribed client to [`acquire`][ClientLock::acquire] the
//! lock becomes the *allowed* client.  Every other request is checked against
//! it with [`check`][ClientLock::check] before anything reaches the hardware.
//! The lock is cleared by [`release`][ClientLock::release] on `stop` or when
//! the allowed client disconnects.

use mancon_types::{ClientConnection, ClientId, ControlError};
use parking_lot::Mutex;
use tracing::info;

/// Outcome of a successful [`ClientLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The lock was free and now belongs to the caller.
    Fresh,
    /// The caller already held the lock.
    AlreadyHeld,
}

/// Records which client, if any, may submit hardware commands.
///
/// # Example
///
/// ```
/// use mancon_kernel::client_lock::{Acquired, ClientLock};
/// use mancon_types::ClientConnection;
///
/// let lock = ClientLock::new();
/// let a = ClientConnection::local("a");
/// assert_eq!(lock.acquire(&a).unwrap(), Acquired::Fresh);
/// assert!(lock.check(&a.id).is_ok());
/// assert!(lock.acquire(&ClientConnection::local("b")).is_err());
/// ```
#[derive(Default)]
pub struct ClientLock {
    allowed: Mutex<Option<ClientId>>,
}

impl ClientLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the bridge to `client`.
    ///
    /// # Errors
    ///
    /// - [`ControlError::Unauthorized`] – the connection is not local or has
    ///   not subscribed to the manual-control channel.
    /// - [`ControlError::LifecycleConflict`] – a different client holds the
    ///   lock.
    pub fn acquire(&self, client: &ClientConnection) -> Result<Acquired, ControlError> {
        if !client.is_local {
            return Err(ControlError::Unauthorized(
                "manual control may only be started from a local connection".to_string(),
            ));
        }
        if !client.subscribed {
            return Err(ControlError::Unauthorized(
                "client is not subscribed to the manual-control channel".to_string(),
            ));
        }

        let mut allowed = self.allowed.lock();
        match allowed.as_ref() {
            Some(holder) if *holder == client.id => Ok(Acquired::AlreadyHeld),
            Some(holder) => Err(ControlError::LifecycleConflict(format!(
                "manual control is locked by another client ({holder})"
            ))),
            None => {
                info!(client = %client.id, "manual-control client lock acquired");
                *allowed = Some(client.id.clone());
                Ok(Acquired::Fresh)
            }
        }
    }

    /// `Ok(())` when `client` is the allowed client.
    pub fn check(&self, client: &ClientId) -> Result<(), ControlError> {
        match self.allowed.lock().as_ref() {
            Some(holder) if holder == client => Ok(()),
            Some(_) => Err(ControlError::Unauthorized(
                "another client is in control of the hardware".to_string(),
            )),
            None => Err(ControlError::Unauthorized(
                "no manual-control session; send start first".to_string(),
            )),
        }
    }

    pub fn holder(&self) -> Option<ClientId> {
        self.allowed.lock().clone()
    }

    /// Clear the lock, returning the client that held it.  Idempotent.
    pub fn release(&self) -> Option<ClientId> {
        let released = self.allowed.lock().take();
        if let Some(client) = &released {
            info!(client = %client, "manual-control client lock released");
        }
        released
    }

    /// Clear the lock only if `client` holds it.
    pub fn release_if_held_by(&self, client: &ClientId) -> bool {
        let mut allowed = self.allowed.lock();
        if allowed.as_ref() == Some(client) {
            *allowed = None;
            info!(client = %client, "manual-control client lock released");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_idempotent_for_the_same_client() {
        let lock = ClientLock::new();
        let a = ClientConnection::local("a");
        assert_eq!(lock.acquire(&a).unwrap(), Acquired::Fresh);
        assert_eq!(lock.acquire(&a).unwrap(), Acquired::AlreadyHeld);
        assert_eq!(lock.holder(), Some(a.id));
    }

    #[test]
    fn second_client_is_a_lifecycle_conflict() {
        let lock = ClientLock::new();
        lock.acquire(&ClientConnection::local("a")).unwrap();
        let err = lock.acquire(&ClientConnection::local("b")).unwrap_err();
        assert!(matches!(err, ControlError::LifecycleConflict(_)));
    }

    #[test]
    fn remote_and_unsubscribed_clients_are_unauthorized() {
        let lock = ClientLock::new();
        let remote = ClientConnection::remote("r");
        assert!(matches!(lock.acquire(&remote), Err(ControlError::Unauthorized(_))));

        let mut quiet = ClientConnection::local("q");
        quiet.subscribed = false;
        assert!(matches!(lock.acquire(&quiet), Err(ControlError::Unauthorized(_))));
        assert!(lock.holder().is_none());
    }

    #[test]
    fn check_rejects_everyone_but_the_holder() {
        let lock = ClientLock::new();
        let a = ClientConnection::local("a");
        assert!(lock.check(&a.id).is_err());

        lock.acquire(&a).unwrap();
        assert!(lock.check(&a.id).is_ok());
        assert!(matches!(
            lock.check(&ClientId::new("b")),
            Err(ControlError::Unauthorized(_))
        ));
    }

    #[test]
    fn release_is_idempotent_and_frees_the_lock() {
        let lock = ClientLock::new();
        let a = ClientConnection::local("a");
        lock.acquire(&a).unwrap();

        assert_eq!(lock.release(), Some(a.id.clone()));
        assert_eq!(lock.release(), None);

        let b = ClientConnection::local("b");
        assert_eq!(lock.acquire(&b).unwrap(), Acquired::Fresh);
    }

    #[test]
    fn release_if_held_by_ignores_other_clients() {
        let lock = ClientLock::new();
        let a = ClientConnection::local("a");
        lock.acquire(&a).unwrap();

        assert!(!lock.release_if_held_by(&ClientId::new("b")));
        assert!(lock.release_if_held_by(&a.id));
        assert!(lock.holder().is_none());
    }
}
