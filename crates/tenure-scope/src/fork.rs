//! Fork guards: temporary holds that keep a scope from closing.

use tenure_core::ScopeError;
use tracing::debug;

use crate::scope::Scope;

/// An outstanding fork on a scope.
///
/// While a fork is held the scope cannot close. The fork is released when
/// the guard is dropped or explicitly via [`release`](Self::release). The
/// guard may be sent to another thread and released there, even for a
/// confined scope.
#[must_use = "dropping a fork releases it immediately"]
#[derive(Debug)]
pub struct ScopeFork {
    scope: Scope,
    armed: bool,
}

impl ScopeFork {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope, armed: true }
    }

    /// The scope this fork keeps alive.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Take another fork on the same root scope.
    pub fn acquire(&self) -> Result<ScopeFork, ScopeError> {
        self.scope.acquire()
    }

    /// Fail unless the root scope is valid for the calling thread.
    pub fn check_valid(&self) -> Result<(), ScopeError> {
        self.scope.check_valid()
    }

    /// Release the fork, reporting a counter underflow instead of
    /// swallowing it.
    #[doc(alias = "close")]
    pub fn release(mut self) -> Result<(), ScopeError> {
        self.armed = false;
        self.scope.release_fork()
    }
}

impl Drop for ScopeFork {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.scope.release_fork() {
            debug!(scope = %self.scope.id(), error = %e, "fork release on drop failed");
        }
    }
}

// Compile-time assertion: forks can travel to other threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ScopeFork>();
};
