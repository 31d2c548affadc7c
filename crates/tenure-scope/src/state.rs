//! Atomic storage for [`ScopeState`].
//!
//! The state lives in one `AtomicU64` so that the alive/closing/closed
//! tag and the fork count always change together under a single CAS.

use std::sync::atomic::{AtomicU64, Ordering};

use tenure_core::ScopeState;

/// A [`ScopeState`] updated exclusively through atomic operations.
///
/// All operations are `SeqCst`: a shared close publishes `Closing` and
/// then reads every access slot, while an access publishes its pin and
/// then reads the state. Both sides need a single total order for one of
/// them to observe the other.
pub(crate) struct AtomicScopeState {
    word: AtomicU64,
}

impl AtomicScopeState {
    pub(crate) fn new(state: ScopeState) -> Self {
        Self {
            word: AtomicU64::new(state.pack()),
        }
    }

    pub(crate) fn load(&self) -> ScopeState {
        ScopeState::unpack(self.word.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: ScopeState) {
        self.word.store(state.pack(), Ordering::SeqCst);
    }

    /// Replace `current` with `new`, returning the observed state on failure.
    pub(crate) fn compare_exchange(
        &self,
        current: ScopeState,
        new: ScopeState,
    ) -> Result<(), ScopeState> {
        self.word
            .compare_exchange(
                current.pack(),
                new.pack(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(ScopeState::unpack)
    }

    /// Apply `f` in a CAS loop until it succeeds or `f` declines.
    ///
    /// `f` maps the observed state to the desired next state, or to an
    /// error that aborts the loop. Returns the state that was replaced.
    pub(crate) fn update<E>(
        &self,
        mut f: impl FnMut(ScopeState) -> Result<ScopeState, E>,
    ) -> Result<ScopeState, E> {
        let mut current = self.load();
        loop {
            let next = f(current)?;
            match self.compare_exchange(current, next) {
                Ok(()) => return Ok(current),
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn compare_exchange_reports_observed_state() {
        let state = AtomicScopeState::new(ScopeState::Alive { forks: 2 });
        let err = state
            .compare_exchange(ScopeState::OPEN, ScopeState::Closed)
            .unwrap_err();
        assert_eq!(err, ScopeState::Alive { forks: 2 });
        assert_eq!(state.load(), ScopeState::Alive { forks: 2 });
    }

    #[test]
    fn update_stops_on_error() {
        let state = AtomicScopeState::new(ScopeState::Closed);
        let result: Result<ScopeState, &str> = state.update(|s| match s {
            ScopeState::Alive { forks } => Ok(ScopeState::Alive { forks: forks + 1 }),
            _ => Err("dead"),
        });
        assert_eq!(result, Err("dead"));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let state = Arc::new(AtomicScopeState::new(ScopeState::OPEN));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        state
                            .update(|s| -> Result<ScopeState, ()> {
                                Ok(ScopeState::Alive {
                                    forks: s.forks() + 1,
                                })
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(state.load(), ScopeState::Alive { forks: 4000 });
    }
}
