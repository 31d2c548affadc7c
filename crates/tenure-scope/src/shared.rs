//! Scopes usable concurrently from any thread.
//!
//! Every state change is a CAS on the packed state word. Close first moves
//! `Alive { forks: 0 }` to `Closing`, which makes every new access and
//! fork fail, then waits for the quiescence barrier to confirm that no
//! thread is still inside an access. Only then does the state become
//! `Closed` and the cleanup chain run. If an access is still in flight
//! after the spin budget, the state reverts to alive and the close reports
//! `Busy`.

use std::sync::Arc;

use tenure_core::{ScopeError, ScopeId, ScopeState};
use tracing::debug;

use crate::cleanup::CleanupChain;
use crate::config::ScopeConfig;
use crate::lifetime::{Attachment, Lifetime};
use crate::quiesce::{self, PinGuard};

/// A scope whose resources may be used from any thread.
#[derive(Clone)]
pub struct SharedScope {
    lifetime: Arc<Lifetime>,
}

impl SharedScope {
    /// Create a shared scope with default configuration.
    pub fn new() -> Self {
        Self::with_parts(ScopeConfig::default(), CleanupChain::new(), None)
    }

    pub(crate) fn with_parts(
        config: ScopeConfig,
        cleanup: CleanupChain,
        attachment: Option<Attachment>,
    ) -> Self {
        let lifetime = Arc::new(Lifetime::with_cleanup(config, cleanup, attachment));
        debug!(scope = %lifetime.id, "shared scope created");
        Self { lifetime }
    }

    /// The scope's unique id.
    pub fn id(&self) -> ScopeId {
        self.lifetime.id
    }

    /// Configuration the scope was created with.
    pub fn config(&self) -> ScopeConfig {
        self.lifetime.config
    }

    /// Current lifecycle state. Racy by nature.
    pub fn state(&self) -> ScopeState {
        self.lifetime.state.load()
    }

    /// Whether the scope is still alive. Advisory only.
    pub fn is_alive(&self) -> bool {
        self.state().is_alive()
    }

    /// Fail unless the scope is alive.
    ///
    /// A success says nothing about the state a moment later; hold a fork
    /// or an access pin for that.
    #[inline]
    pub fn check_valid(&self) -> Result<(), ScopeError> {
        self.lifetime.check_alive()
    }

    /// Pin the scope for the calling thread, then confirm it is alive.
    ///
    /// While the returned pin lives, a concurrent close cannot complete.
    pub(crate) fn pin(&self) -> Result<PinGuard, ScopeError> {
        let guard = quiesce::pin(self.lifetime.id).ok_or(ScopeError::Unsupported {
            scope: self.lifetime.id,
            operation: "access during thread teardown",
        })?;
        self.lifetime.check_alive()?;
        Ok(guard)
    }

    pub(crate) fn acquire_fork(&self) -> Result<(), ScopeError> {
        self.lifetime.increment_forks()
    }

    pub(crate) fn release_fork(&self) -> Result<(), ScopeError> {
        self.lifetime.decrement_forks()
    }

    /// Register an action to run when the scope closes.
    ///
    /// Lock-free; fails with `InvalidScope` once the cleanup chain has
    /// been drained.
    pub fn add_cleanup(&self, action: impl FnOnce() + Send + 'static) -> Result<(), ScopeError> {
        if self.state() == ScopeState::Closed {
            return Err(self.lifetime.closed_error(ScopeState::Closed));
        }
        self.lifetime.push_cleanup(Box::new(action))
    }

    /// Close the scope once no access is in flight, then run its cleanup.
    ///
    /// # Errors
    ///
    /// - `InvalidScope` if already closing or closed.
    /// - `StillForked` while forks are outstanding.
    /// - `Busy` if in-flight accesses did not drain within the configured
    ///   spin budget; the scope is alive again and the close may be retried.
    pub fn close(&self) -> Result<(), ScopeError> {
        let id = self.lifetime.id;
        self.lifetime.begin_close(ScopeState::Closing)?;
        if let Err(pinned) = quiesce::await_quiescent(id, self.lifetime.config.close_spin_limit) {
            self.lifetime.state.store(ScopeState::OPEN);
            debug!(scope = %id, pinned, "shared close busy; scope reopened");
            return Err(ScopeError::Busy { scope: id, pinned });
        }
        self.lifetime.state.store(ScopeState::Closed);
        let ran = self.lifetime.release_resources();
        debug!(scope = %id, actions = ran, "shared scope closed");
        Ok(())
    }
}

impl Default for SharedScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedScope")
            .field("id", &self.lifetime.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tenure_core::InvalidCause;

    #[test]
    fn close_from_another_thread() {
        let scope = SharedScope::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        scope
            .add_cleanup(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let remote = scope.clone();
        thread::spawn(move || remote.close().unwrap())
            .join()
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scope.check_valid().is_err());
    }

    #[test]
    fn forks_block_close() {
        let scope = SharedScope::new();
        scope.acquire_fork().unwrap();
        scope.acquire_fork().unwrap();
        assert_eq!(
            scope.close(),
            Err(ScopeError::StillForked {
                scope: scope.id(),
                forks: 2
            })
        );
        scope.release_fork().unwrap();
        scope.release_fork().unwrap();
        scope.close().unwrap();
        assert_eq!(
            scope.acquire_fork(),
            Err(ScopeError::invalid(scope.id(), InvalidCause::Closed))
        );
    }

    #[test]
    fn in_flight_access_makes_close_busy() {
        let scope = SharedScope::with_parts(
            ScopeConfig::new().with_close_spin_limit(16),
            CleanupChain::new(),
            None,
        );
        let (pinned_tx, pinned_rx) = crossbeam_channel::bounded(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let remote = scope.clone();
        let worker = thread::spawn(move || {
            let _pin = remote.pin().unwrap();
            pinned_tx.send(()).unwrap();
            done_rx.recv().unwrap();
        });
        pinned_rx.recv().unwrap();

        assert_eq!(
            scope.close(),
            Err(ScopeError::Busy {
                scope: scope.id(),
                pinned: 1
            })
        );
        assert!(scope.is_alive());

        done_tx.send(()).unwrap();
        worker.join().unwrap();
        scope.close().unwrap();
    }

    #[test]
    fn pin_fails_after_close() {
        let scope = SharedScope::new();
        scope.close().unwrap();
        assert!(scope.pin().is_err());
        assert_eq!(quiesce::pinned_by(scope.id()), 0);
    }

    #[test]
    fn add_after_close_is_rejected() {
        let scope = SharedScope::new();
        scope.close().unwrap();
        assert!(scope.add_cleanup(|| {}).unwrap_err().is_invalid_scope());
    }
}
