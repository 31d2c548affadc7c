//! The public scope handle.
//!
//! [`Scope`] is a cheap, clonable handle over one of three kinds of
//! lifetime:
//!
//! | Kind | Accessible from | Close |
//! |------|-----------------|-------|
//! | Confined | owner thread only | owner thread, immediate |
//! | Shared | any thread | any thread, after in-flight accesses drain |
//! | Global | any thread | never |
//!
//! Clones share the same lifetime; closing through any clone closes all
//! of them.

use std::marker::PhantomData;
use std::sync::OnceLock;
use std::thread::ThreadId;
use std::time::Duration;

use tenure_core::{ScopeError, ScopeId, ScopeState};
use tracing::debug;

use crate::builder::ScopeBuilder;
use crate::config::ScopeConfig;
use crate::confined::ConfinedScope;
use crate::fork::ScopeFork;
use crate::quiesce::PinGuard;
use crate::shared::SharedScope;

/// Upper bound on a single backoff sleep in [`Scope::close_with_retry`].
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// The process-wide scope that is always alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalScope {
    id: ScopeId,
}

impl GlobalScope {
    fn get() -> Self {
        static ID: OnceLock<ScopeId> = OnceLock::new();
        Self {
            id: *ID.get_or_init(ScopeId::next),
        }
    }

    fn unsupported(&self, operation: &'static str) -> ScopeError {
        ScopeError::Unsupported {
            scope: self.id,
            operation,
        }
    }
}

/// A handle to a lifetime that bounds access to native resources.
#[derive(Clone, Debug)]
pub enum Scope {
    /// Usable only from one owner thread.
    Confined(ConfinedScope),
    /// Usable from any thread; close waits for in-flight accesses.
    Shared(SharedScope),
    /// Always alive; never closes.
    Global(GlobalScope),
}

impl Scope {
    /// A scope confined to the calling thread.
    pub fn confined() -> Self {
        Self::Confined(ConfinedScope::new())
    }

    /// A scope confined to `owner`.
    pub fn confined_to(owner: ThreadId) -> Self {
        Self::Confined(ConfinedScope::owned_by(owner))
    }

    /// A scope usable from any thread.
    pub fn shared() -> Self {
        Self::Shared(SharedScope::new())
    }

    /// The global scope. Every call returns a handle to the same scope.
    pub fn global() -> Self {
        Self::Global(GlobalScope::get())
    }

    /// Start building a scope with explicit configuration.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    /// The scope's unique id.
    pub fn id(&self) -> ScopeId {
        match self {
            Self::Confined(s) => s.id(),
            Self::Shared(s) => s.id(),
            Self::Global(g) => g.id,
        }
    }

    /// The owner thread of a confined scope; `None` for shared and global.
    pub fn owner(&self) -> Option<ThreadId> {
        match self {
            Self::Confined(s) => Some(s.owner()),
            _ => None,
        }
    }

    /// Configuration of the scope. The global scope reports the default.
    pub fn config(&self) -> ScopeConfig {
        match self {
            Self::Confined(s) => s.config(),
            Self::Shared(s) => s.config(),
            Self::Global(_) => ScopeConfig::default(),
        }
    }

    /// Current lifecycle state.
    ///
    /// The global scope does not count forks and always reports
    /// [`ScopeState::OPEN`].
    pub fn state(&self) -> ScopeState {
        match self {
            Self::Confined(s) => s.state(),
            Self::Shared(s) => s.state(),
            Self::Global(_) => ScopeState::OPEN,
        }
    }

    /// Whether the scope is alive.
    ///
    /// Advisory: the answer may be stale by the time it is read. Use
    /// [`check_valid`](Self::check_valid) or hold a fork for a decision
    /// that matters.
    pub fn is_alive(&self) -> bool {
        self.state().is_alive()
    }

    /// Whether this is a confined scope.
    pub fn is_confined(&self) -> bool {
        matches!(self, Self::Confined(_))
    }

    /// Whether this is a shared scope.
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Whether this is the global scope.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global(_))
    }

    /// Whether `thread` may currently access resources of this scope.
    pub fn is_accessible_by(&self, thread: ThreadId) -> bool {
        match self {
            Self::Confined(s) => s.owner() == thread && s.is_alive(),
            _ => self.is_alive(),
        }
    }

    /// Fail with `InvalidScope` unless the scope is alive and, if
    /// confined, the caller is the owner thread.
    #[inline]
    pub fn check_valid(&self) -> Result<(), ScopeError> {
        match self {
            Self::Confined(s) => s.check_valid(),
            Self::Shared(s) => s.check_valid(),
            Self::Global(_) => Ok(()),
        }
    }

    /// Enter an access region.
    ///
    /// Succeeds only if [`check_valid`](Self::check_valid) would. For a
    /// shared scope the returned guard also pins the scope in the calling
    /// thread's access slot, so a concurrent close cannot free the
    /// resources until the guard is dropped.
    #[inline]
    pub fn enter(&self) -> Result<AccessGuard, ScopeError> {
        let pin = match self {
            Self::Confined(s) => {
                s.check_valid()?;
                None
            }
            Self::Shared(s) => Some(s.pin()?),
            Self::Global(_) => None,
        };
        Ok(AccessGuard {
            scope: self.id(),
            exclusive: self.is_confined(),
            pin,
            _not_send: PhantomData,
        })
    }

    /// Take a fork that keeps the scope from closing until released.
    ///
    /// # Errors
    ///
    /// `InvalidScope` if the scope is not alive (or, for a confined scope,
    /// off the owner thread); `Overflow` at the configured fork limit.
    pub fn acquire(&self) -> Result<ScopeFork, ScopeError> {
        match self {
            Self::Confined(s) => s.acquire_fork()?,
            Self::Shared(s) => s.acquire_fork()?,
            Self::Global(_) => {}
        }
        Ok(ScopeFork::new(self.clone()))
    }

    pub(crate) fn release_fork(&self) -> Result<(), ScopeError> {
        match self {
            Self::Confined(s) => s.release_fork(),
            Self::Shared(s) => s.release_fork(),
            Self::Global(_) => Ok(()),
        }
    }

    /// Close the scope and run its cleanup actions, newest first.
    ///
    /// A failed close leaves the scope alive. The global scope refuses
    /// with `Unsupported`.
    pub fn close(&self) -> Result<(), ScopeError> {
        match self {
            Self::Confined(s) => s.close(),
            Self::Shared(s) => s.close(),
            Self::Global(g) => Err(g.unsupported("close")),
        }
    }

    /// Close, retrying up to `attempts` times while the close reports
    /// `Busy`, sleeping a linearly growing `backoff` between attempts.
    ///
    /// Every other error is returned at once. Returns the last `Busy` if
    /// the attempts run out.
    pub fn close_with_retry(&self, attempts: u32, backoff: Duration) -> Result<(), ScopeError> {
        let mut attempt = 0u32;
        loop {
            match self.close() {
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    attempt += 1;
                    let sleep = backoff.saturating_mul(attempt).min(MAX_BACKOFF);
                    debug!(scope = %self.id(), attempt, ?sleep, "close busy; retrying");
                    std::thread::sleep(sleep);
                }
                other => return other,
            }
        }
    }

    /// Register an action to run when the scope closes.
    ///
    /// Actions run in reverse registration order. Confined scopes accept
    /// registrations only from the owner thread. The global scope never
    /// runs cleanup and refuses with `Unsupported`.
    pub fn add_cleanup(&self, action: impl FnOnce() + Send + 'static) -> Result<(), ScopeError> {
        match self {
            Self::Confined(s) => s.add_cleanup(action),
            Self::Shared(s) => s.add_cleanup(action),
            Self::Global(g) => Err(g.unsupported("add_cleanup")),
        }
    }

    /// Keep `target` alive for as long as this scope is alive.
    ///
    /// Takes a fork on `target` that is released by this scope's cleanup,
    /// so `target` cannot close before this scope does. A confined target
    /// must be kept alive from its owner thread.
    pub fn keep_alive(&self, target: &Scope) -> Result<(), ScopeError> {
        if target.id() == self.id() {
            return Err(ScopeError::Unsupported {
                scope: self.id(),
                operation: "keep_alive on itself",
            });
        }
        let fork = target.acquire()?;
        self.add_cleanup(move || drop(fork))?;
        debug!(scope = %self.id(), target = %target.id(), "keep-alive registered");
        Ok(())
    }

    /// Move every pending resource of a confined scope to a new scope
    /// owned by `new_owner`.
    ///
    /// This scope ends up closed without running cleanup. Shared and
    /// global scopes refuse with `Unsupported`.
    pub fn dup(&self, new_owner: ThreadId) -> Result<Scope, ScopeError> {
        match self {
            Self::Confined(s) => s.dup(new_owner).map(Self::Confined),
            Self::Shared(s) => Err(ScopeError::Unsupported {
                scope: s.id(),
                operation: "dup",
            }),
            Self::Global(g) => Err(g.unsupported("dup")),
        }
    }
}

impl From<ConfinedScope> for Scope {
    fn from(scope: ConfinedScope) -> Self {
        Self::Confined(scope)
    }
}

impl From<SharedScope> for Scope {
    fn from(scope: SharedScope) -> Self {
        Self::Shared(scope)
    }
}

/// An open access region on a scope.
///
/// Obtained from [`Scope::enter`]. While it lives, the scope cannot finish
/// closing. Not `Send`: the pin it may hold belongs to the creating thread.
#[must_use]
pub struct AccessGuard {
    scope: ScopeId,
    exclusive: bool,
    pin: Option<PinGuard>,
    _not_send: PhantomData<*const ()>,
}

impl AccessGuard {
    /// The scope this access region was entered on.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Whether no other thread can touch the scope's resources during the
    /// access. True for confined scopes only.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether the guard holds a quiescence pin (shared scopes only).
    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }
}

impl std::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard")
            .field("scope", &self.scope)
            .field("exclusive", &self.exclusive)
            .field("pinned", &self.is_pinned())
            .finish()
    }
}
