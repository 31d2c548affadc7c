//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use tenure_core::{AccessError, ScopeError};

/// Errors from native allocation and arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// A bounded arena has no room left for the request.
    Exhausted {
        /// Bytes requested, including alignment padding.
        requested: usize,
        /// Bytes left in the arena's block.
        available: usize,
    },
    /// `align` is zero or not a power of two, or `size` overflows when
    /// rounded up to it.
    InvalidLayout {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment.
        align: usize,
    },
    /// An [`ArenaConfig`](crate::ArenaConfig) failed validation.
    InvalidConfig {
        /// Which constraint was violated.
        reason: &'static str,
    },
    /// The owning scope or a segment access refused the operation.
    Access(AccessError),
}

impl ArenaError {
    /// Whether the underlying cause is an invalid (dead or foreign) scope.
    pub fn is_invalid_scope(&self) -> bool {
        matches!(self, Self::Access(e) if e.is_invalid_scope())
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted {
                requested,
                available,
            } => write!(
                f,
                "arena exhausted: requested {requested} bytes, {available} bytes available"
            ),
            Self::InvalidLayout { size, align } => {
                write!(f, "invalid layout: size {size}, align {align}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
            Self::Access(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Access(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AccessError> for ArenaError {
    fn from(e: AccessError) -> Self {
        Self::Access(e)
    }
}

impl From<ScopeError> for ArenaError {
    fn from(e: ScopeError) -> Self {
        Self::Access(AccessError::Scope(e))
    }
}
