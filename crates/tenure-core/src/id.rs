//! Strongly-typed identifiers and access modes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`ScopeId`] allocation.
///
/// Starts at 1 so that 0 is never a valid id; access slots use 0 to
/// mean "not pinned".
static SCOPE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a scope.
///
/// Allocated from a monotonic atomic counter via [`ScopeId::next`]. A
/// scope produced by `dup` gets a fresh id, so pins and diagnostics
/// recorded against the old scope can never be confused with the new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocate a fresh, unique scope id. Thread-safe.
    pub fn next() -> Self {
        Self(SCOPE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value. Never zero.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// The kind of access a caller wants to perform on a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Load bytes from the region.
    Read,
    /// Store bytes into the region.
    Write,
}

impl AccessMode {
    /// Whether this mode mutates the region.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_ids_are_unique_and_non_zero() {
        let a = ScopeId::next();
        let b = ScopeId::next();
        assert_ne!(a, b);
        assert!(a.get() > 0);
        assert!(b.get() > a.get());
    }

    #[test]
    fn scope_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..100).map(|_| ScopeId::next()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<ScopeId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn access_mode_write_flag() {
        assert!(AccessMode::Write.is_write());
        assert!(!AccessMode::Read.is_write());
        assert_eq!(AccessMode::Read.to_string(), "read");
    }
}
