//! State shared by every handle, fork, and segment of one scope.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use tenure_core::{InvalidCause, ScopeError, ScopeId, ScopeState};
use tracing::{debug, warn};

use crate::cleanup::{CleanupAction, CleanupChain};
use crate::config::ScopeConfig;
use crate::state::AtomicScopeState;

/// A strong reference kept alive until the scope closes.
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// Reference-counted heart of a confined or shared scope.
///
/// Dropping the last reference to a scope that was never closed drains its
/// cleanup chain: once nothing can reach the scope, nothing can access the
/// resources it guards.
pub(crate) struct Lifetime {
    pub(crate) id: ScopeId,
    pub(crate) state: AtomicScopeState,
    pub(crate) cleanup: CleanupChain,
    attachment: Mutex<Option<Attachment>>,
    pub(crate) config: ScopeConfig,
}

impl Lifetime {
    pub(crate) fn with_cleanup(
        config: ScopeConfig,
        cleanup: CleanupChain,
        attachment: Option<Attachment>,
    ) -> Self {
        Self {
            id: ScopeId::next(),
            state: AtomicScopeState::new(ScopeState::OPEN),
            cleanup,
            attachment: Mutex::new(attachment),
            config,
        }
    }

    pub(crate) fn closed_error(&self, state: ScopeState) -> ScopeError {
        let cause = match state {
            ScopeState::Closing => InvalidCause::Closing,
            _ => InvalidCause::Closed,
        };
        ScopeError::invalid(self.id, cause)
    }

    /// Fail unless the scope is alive.
    pub(crate) fn check_alive(&self) -> Result<(), ScopeError> {
        match self.state.load() {
            ScopeState::Alive { .. } => Ok(()),
            other => Err(self.closed_error(other)),
        }
    }

    /// CAS-loop increment of the fork counter.
    pub(crate) fn increment_forks(&self) -> Result<(), ScopeError> {
        let max_forks = self.config.max_forks;
        self.state
            .update(|s| match s {
                ScopeState::Alive { forks } if forks >= max_forks => Err(ScopeError::Overflow {
                    scope: self.id,
                    max_forks,
                }),
                ScopeState::Alive { forks } => Ok(ScopeState::Alive { forks: forks + 1 }),
                other => Err(self.closed_error(other)),
            })
            .map(|_| ())
    }

    /// CAS-loop decrement of the fork counter. Safe from any thread.
    pub(crate) fn decrement_forks(&self) -> Result<(), ScopeError> {
        self.state
            .update(|s| match s {
                ScopeState::Alive { forks: 0 } => {
                    Err(ScopeError::invalid(self.id, InvalidCause::NotForked))
                }
                ScopeState::Alive { forks } => Ok(ScopeState::Alive { forks: forks - 1 }),
                other => Err(self.closed_error(other)),
            })
            .map(|_| ())
    }

    /// Transition `Alive { forks: 0 }` to `next`, reporting why not otherwise.
    pub(crate) fn begin_close(&self, next: ScopeState) -> Result<(), ScopeError> {
        match self.state.compare_exchange(ScopeState::OPEN, next) {
            Ok(()) => Ok(()),
            Err(ScopeState::Alive { forks }) => Err(ScopeError::StillForked {
                scope: self.id,
                forks,
            }),
            Err(other) => Err(self.closed_error(other)),
        }
    }

    pub(crate) fn push_cleanup(&self, action: CleanupAction) -> Result<(), ScopeError> {
        self.cleanup
            .push(action)
            .map_err(|_rejected| ScopeError::invalid(self.id, InvalidCause::Closed))
    }

    /// Run the cleanup chain and release the attachment. Called once the
    /// state is `Closed`.
    pub(crate) fn release_resources(&self) -> usize {
        let ran = self.cleanup.drain();
        let attachment = self.attachment.lock().take();
        drop(attachment);
        ran
    }

    /// Detach pending cleanup and the attachment for a handoff.
    ///
    /// The returned chain is empty if the old chain was already drained.
    pub(crate) fn detach(&self) -> (CleanupChain, Option<Attachment>) {
        let cleanup = self
            .cleanup
            .take()
            .map_or_else(CleanupChain::new, CleanupChain::from_pending);
        let attachment = self.attachment.lock().take();
        (cleanup, attachment)
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        if self.state.load() == ScopeState::Closed {
            return;
        }
        let ran = self.release_resources();
        if ran > 0 {
            warn!(scope = %self.id, actions = ran, "scope dropped without close; ran cleanup");
        } else {
            debug!(scope = %self.id, "scope dropped without close");
        }
    }
}
