//! Scope configuration parameters.

/// Configuration shared by confined and shared scopes.
///
/// Fixed at scope creation; a scope produced by `dup` inherits the
/// configuration of the scope it replaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeConfig {
    /// Maximum number of simultaneously outstanding forks.
    ///
    /// `acquire()` fails with `ScopeError::Overflow` once the counter
    /// reaches this value. Default: `u32::MAX`.
    pub max_forks: u32,

    /// How many times a shared close re-scans the access slots while
    /// waiting for in-flight accesses to drain before reporting
    /// `ScopeError::Busy`.
    ///
    /// Default: 1024. Zero means a single scan with no waiting.
    pub close_spin_limit: u32,
}

impl ScopeConfig {
    /// Default fork limit.
    pub const DEFAULT_MAX_FORKS: u32 = u32::MAX;

    /// Default quiescence spin budget for shared close.
    pub const DEFAULT_CLOSE_SPIN_LIMIT: u32 = 1024;

    /// Create a config with default values.
    pub const fn new() -> Self {
        Self {
            max_forks: Self::DEFAULT_MAX_FORKS,
            close_spin_limit: Self::DEFAULT_CLOSE_SPIN_LIMIT,
        }
    }

    /// Set the fork limit.
    pub const fn with_max_forks(mut self, max_forks: u32) -> Self {
        self.max_forks = max_forks;
        self
    }

    /// Set the quiescence spin budget.
    pub const fn with_close_spin_limit(mut self, limit: u32) -> Self {
        self.close_spin_limit = limit;
        self
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self::new()
    }
}
