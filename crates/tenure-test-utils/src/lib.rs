//! Test utilities for Tenure development.
//!
//! Provides helpers that record when and in which order cleanup actions
//! run ([`CleanupCounter`], [`OrderLog`]), thread fixtures for
//! confinement and handoff tests (see [`fixtures`]), and a `tracing`
//! event recorder ([`events::EventCapture`]).
//!
//! This crate deliberately does not depend on the scope crates, so that
//! their own unit tests can use it.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod events;
pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts how many times the actions it hands out have run.
///
/// Clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct CleanupCounter {
    runs: Arc<AtomicUsize>,
}

impl CleanupCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cleanup action that bumps the counter when run.
    pub fn action(&self) -> impl FnOnce() + Send + 'static {
        let runs = Arc::clone(&self.runs);
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Number of actions that have run so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Whether at least one action has run.
    pub fn fired(&self) -> bool {
        self.runs() > 0
    }
}

/// Records the labels of actions in the order they run.
#[derive(Clone, Debug, Default)]
pub struct OrderLog {
    log: Arc<Mutex<Vec<u32>>>,
}

impl OrderLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cleanup action that appends `label` when run.
    pub fn action(&self, label: u32) -> impl FnOnce() + Send + 'static {
        let log = Arc::clone(&self.log);
        move || {
            log.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(label);
        }
    }

    /// Labels recorded so far, in execution order.
    pub fn order(&self) -> Vec<u32> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_counts_runs_across_clones() {
        let counter = CleanupCounter::new();
        let other = counter.clone();
        (counter.action())();
        (other.action())();
        assert_eq!(counter.runs(), 2);
        assert!(other.fired());
    }

    #[test]
    fn order_log_records_sequence() {
        let log = OrderLog::new();
        let a = log.action(1);
        let b = log.action(2);
        b();
        a();
        assert_eq!(log.order(), vec![2, 1]);
    }
}
