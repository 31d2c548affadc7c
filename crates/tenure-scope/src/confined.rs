//! Scopes confined to a single owner thread.
//!
//! Only the owner may close, fork, duplicate, or register cleanup on a
//! confined scope, and only the owner passes [`check_valid`]. Because no
//! other thread can ever be mid-access, close needs no quiescence step:
//! a successful CAS to `Closed` is enough to free the resources.
//!
//! Fork releases may arrive from any thread (a fork guard can be moved to
//! a worker and dropped there). The fork count lives in the same atomic
//! word as the liveness tag, so a close can never observe a stale count.
//!
//! [`check_valid`]: ConfinedScope::check_valid

use std::sync::Arc;
use std::thread::{self, ThreadId};

use tenure_core::{InvalidCause, ScopeError, ScopeId, ScopeState};
use tracing::debug;

use crate::cleanup::CleanupChain;
use crate::config::ScopeConfig;
use crate::lifetime::{Attachment, Lifetime};

/// A scope whose resources may only be used from its owner thread.
#[derive(Clone)]
pub struct ConfinedScope {
    lifetime: Arc<Lifetime>,
    owner: ThreadId,
}

impl ConfinedScope {
    /// Create a scope confined to the calling thread.
    pub fn new() -> Self {
        Self::owned_by(thread::current().id())
    }

    /// Create a scope confined to an explicit thread.
    pub fn owned_by(owner: ThreadId) -> Self {
        Self::with_parts(owner, ScopeConfig::default(), CleanupChain::new(), None)
    }

    pub(crate) fn with_parts(
        owner: ThreadId,
        config: ScopeConfig,
        cleanup: CleanupChain,
        attachment: Option<Attachment>,
    ) -> Self {
        let lifetime = Arc::new(Lifetime::with_cleanup(config, cleanup, attachment));
        debug!(scope = %lifetime.id, ?owner, "confined scope created");
        Self { lifetime, owner }
    }

    /// The scope's unique id.
    pub fn id(&self) -> ScopeId {
        self.lifetime.id
    }

    /// The thread this scope is confined to.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Configuration the scope was created with.
    pub fn config(&self) -> ScopeConfig {
        self.lifetime.config
    }

    /// Current lifecycle state. Racy when read off the owner thread.
    pub fn state(&self) -> ScopeState {
        self.lifetime.state.load()
    }

    /// Whether the scope is still alive. Advisory only.
    pub fn is_alive(&self) -> bool {
        self.state().is_alive()
    }

    /// Fail unless the scope is alive and the caller is the owner thread.
    #[inline]
    pub fn check_valid(&self) -> Result<(), ScopeError> {
        self.lifetime.check_alive()?;
        self.check_owner()
    }

    #[inline]
    fn check_owner(&self) -> Result<(), ScopeError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(ScopeError::invalid(
                self.lifetime.id,
                InvalidCause::WrongThread { owner: self.owner },
            ))
        }
    }

    /// Increment the fork counter. Owner thread only.
    pub(crate) fn acquire_fork(&self) -> Result<(), ScopeError> {
        self.check_owner()?;
        self.lifetime.increment_forks()
    }

    /// Decrement the fork counter. Any thread.
    pub(crate) fn release_fork(&self) -> Result<(), ScopeError> {
        self.lifetime.decrement_forks()
    }

    /// Register an action to run when the scope closes. Owner thread only.
    pub fn add_cleanup(&self, action: impl FnOnce() + Send + 'static) -> Result<(), ScopeError> {
        self.check_owner()?;
        self.lifetime.check_alive()?;
        self.lifetime.push_cleanup(Box::new(action))
    }

    /// Close the scope and run its cleanup, newest action first.
    ///
    /// Fails with `InvalidScope` off the owner thread or when already
    /// closed, and with `StillForked` while forks are outstanding. A failed
    /// close leaves the scope untouched.
    pub fn close(&self) -> Result<(), ScopeError> {
        self.check_owner()?;
        self.lifetime.begin_close(ScopeState::Closed)?;
        let ran = self.lifetime.release_resources();
        debug!(scope = %self.lifetime.id, actions = ran, "confined scope closed");
        Ok(())
    }

    /// Hand every pending resource over to a new scope owned by `new_owner`.
    ///
    /// This scope is closed without running its cleanup; the returned
    /// scope runs it when it is closed in turn.
    pub fn dup(&self, new_owner: ThreadId) -> Result<ConfinedScope, ScopeError> {
        self.check_owner()?;
        self.lifetime.begin_close(ScopeState::Closed)?;
        let (cleanup, attachment) = self.lifetime.detach();
        let next = Self::with_parts(new_owner, self.lifetime.config, cleanup, attachment);
        debug!(
            from = %self.lifetime.id,
            to = %next.lifetime.id,
            ?new_owner,
            "confined scope handed off"
        );
        Ok(next)
    }
}

impl Default for ConfinedScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfinedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfinedScope")
            .field("id", &self.lifetime.id)
            .field("owner", &self.owner)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn close_runs_cleanup_once() {
        let scope = ConfinedScope::new();
        let (count, action) = counter();
        scope.add_cleanup(action).unwrap();
        scope.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scope.is_alive());
        assert!(matches!(
            scope.close(),
            Err(ScopeError::InvalidScope {
                cause: InvalidCause::Closed,
                ..
            })
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_refused_while_forked() {
        let scope = ConfinedScope::new();
        scope.acquire_fork().unwrap();
        assert_eq!(
            scope.close(),
            Err(ScopeError::StillForked {
                scope: scope.id(),
                forks: 1
            })
        );
        assert!(scope.is_alive());
        scope.release_fork().unwrap();
        scope.close().unwrap();
    }

    #[test]
    fn foreign_thread_is_rejected() {
        let scope = ConfinedScope::new();
        let owner = scope.owner();
        let (count, action) = counter();
        let remote = scope.clone();
        let result = thread::spawn(move || {
            let check = remote.check_valid();
            let close = remote.close();
            let add = remote.add_cleanup(action);
            (check, close, add)
        })
        .join()
        .unwrap();
        for r in [result.0, result.1, result.2] {
            assert_eq!(
                r,
                Err(ScopeError::invalid(
                    scope.id(),
                    InvalidCause::WrongThread { owner }
                ))
            );
        }
        assert!(scope.is_alive());
        scope.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn release_from_another_thread_unblocks_close() {
        let scope = ConfinedScope::new();
        scope.acquire_fork().unwrap();
        let remote = scope.clone();
        thread::spawn(move || remote.release_fork().unwrap())
            .join()
            .unwrap();
        assert_eq!(scope.state(), ScopeState::OPEN);
        scope.close().unwrap();
    }

    #[test]
    fn release_without_fork_is_invalid() {
        let scope = ConfinedScope::new();
        assert_eq!(
            scope.release_fork(),
            Err(ScopeError::invalid(scope.id(), InvalidCause::NotForked))
        );
    }

    #[test]
    fn fork_limit_is_enforced() {
        let scope = ConfinedScope::with_parts(
            thread::current().id(),
            ScopeConfig::new().with_max_forks(2),
            CleanupChain::new(),
            None,
        );
        scope.acquire_fork().unwrap();
        scope.acquire_fork().unwrap();
        assert_eq!(
            scope.acquire_fork(),
            Err(ScopeError::Overflow {
                scope: scope.id(),
                max_forks: 2
            })
        );
        assert_eq!(scope.state().forks(), 2);
    }

    #[test]
    fn dup_moves_cleanup_to_new_owner() {
        let scope = ConfinedScope::new();
        let (count, action) = counter();
        scope.add_cleanup(action).unwrap();

        let (tx, rx) = crossbeam_channel::bounded::<ConfinedScope>(1);
        let worker = thread::spawn(move || {
            let next = rx.recv().unwrap();
            next.check_valid()?;
            next.close()
        });
        let next = scope.dup(worker.thread().id()).unwrap();

        assert!(!scope.is_alive());
        assert_ne!(next.id(), scope.id());
        assert_eq!(next.owner(), worker.thread().id());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        // The old owner can no longer use the new scope.
        assert!(next.check_valid().is_err());

        tx.send(next).unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dup_refused_while_forked() {
        let scope = ConfinedScope::new();
        scope.acquire_fork().unwrap();
        assert!(matches!(
            scope.dup(thread::current().id()),
            Err(ScopeError::StillForked { .. })
        ));
        assert!(scope.is_alive());
    }

    #[test]
    fn drop_without_close_runs_cleanup() {
        let (count, action) = counter();
        {
            let scope = ConfinedScope::new();
            scope.add_cleanup(action).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
