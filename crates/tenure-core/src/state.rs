//! Scope lifecycle state.
//!
//! A scope moves `Alive -> Closing -> Closed` exactly once. While alive it
//! carries the number of outstanding forks (temporary keep-alive holds).
//! `Closing` is only ever observed transiently by the thread running the
//! close, and a shared close that cannot confirm quiescence rolls it back
//! to `Alive`.
//!
//! Scopes store the state in a single atomic word. [`ScopeState::pack`]
//! and [`ScopeState::unpack`] define that word; nothing outside this
//! module depends on the bit layout.

use std::fmt;

const TAG_BITS: u32 = 2;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;
const TAG_ALIVE: u64 = 0;
const TAG_CLOSING: u64 = 1;
const TAG_CLOSED: u64 = 2;

/// Lifecycle state of a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeState {
    /// The scope is usable. `forks` outstanding holds keep it from closing.
    Alive {
        /// Number of outstanding forks.
        forks: u32,
    },
    /// A close is in progress on some thread.
    Closing,
    /// The scope is closed and its cleanup has run (or moved elsewhere).
    Closed,
}

impl ScopeState {
    /// A freshly created scope: alive with no forks.
    pub const OPEN: Self = Self::Alive { forks: 0 };

    /// Whether the scope is alive (with or without forks).
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Alive { .. })
    }

    /// Number of outstanding forks; zero unless alive.
    pub fn forks(self) -> u32 {
        match self {
            Self::Alive { forks } => forks,
            _ => 0,
        }
    }

    /// Encode the state into a single word for atomic storage.
    pub fn pack(self) -> u64 {
        match self {
            Self::Alive { forks } => ((forks as u64) << TAG_BITS) | TAG_ALIVE,
            Self::Closing => TAG_CLOSING,
            Self::Closed => TAG_CLOSED,
        }
    }

    /// Decode a word produced by [`pack`](Self::pack).
    ///
    /// An unknown tag decodes as `Closed`, so a corrupted word can only
    /// ever deny access.
    pub fn unpack(word: u64) -> Self {
        match word & TAG_MASK {
            TAG_ALIVE => Self::Alive {
                forks: (word >> TAG_BITS) as u32,
            },
            TAG_CLOSING => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl Default for ScopeState {
    fn default() -> Self {
        Self::OPEN
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive { forks: 0 } => write!(f, "alive"),
            Self::Alive { forks } => write!(f, "alive ({forks} forks)"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
