//! Error types for scopes and the resource handles built on them.
//!
//! Organized by layer: [`ScopeError`] covers lifecycle and confinement
//! failures, [`AccessError`] covers region access through a handle and
//! wraps the scope error that caused it. None of these are retried
//! automatically; [`ScopeError::Busy`] is the only one a caller may
//! usefully retry.

use std::error::Error;
use std::fmt;
use std::thread::ThreadId;

use crate::id::{AccessMode, ScopeId};

/// Why a scope refused an operation with [`ScopeError::InvalidScope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidCause {
    /// The scope has been closed.
    Closed,
    /// Another thread is closing the scope right now.
    Closing,
    /// The scope is confined to a different thread.
    WrongThread {
        /// The thread the scope is confined to.
        owner: ThreadId,
    },
    /// A release was attempted with no fork outstanding.
    NotForked,
}

impl fmt::Display for InvalidCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "already closed"),
            Self::Closing => write!(f, "being closed"),
            Self::WrongThread { owner } => write!(f, "confined to thread {owner:?}"),
            Self::NotForked => write!(f, "no outstanding fork to release"),
        }
    }
}

/// Errors from scope lifecycle operations and validity checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeError {
    /// The scope is closed, closing, or accessed from the wrong thread.
    InvalidScope {
        /// The scope that refused the operation.
        scope: ScopeId,
        /// What made the scope invalid for this caller.
        cause: InvalidCause,
    },
    /// Close attempted while forks are outstanding.
    StillForked {
        /// The scope that could not be closed.
        scope: ScopeId,
        /// Forks outstanding at the time of the attempt.
        forks: u32,
    },
    /// The fork counter is at its configured maximum.
    Overflow {
        /// The scope whose counter is exhausted.
        scope: ScopeId,
        /// The configured maximum.
        max_forks: u32,
    },
    /// A shared close could not confirm that no thread is mid-access.
    ///
    /// The scope is left alive; the close may be retried.
    Busy {
        /// The scope that could not be closed.
        scope: ScopeId,
        /// Number of access slots still pinned to the scope.
        pinned: usize,
    },
    /// The operation is not meaningful for this kind of scope.
    Unsupported {
        /// The scope that refused the operation.
        scope: ScopeId,
        /// Name of the refused operation.
        operation: &'static str,
    },
}

impl ScopeError {
    /// Shorthand for an [`InvalidScope`](Self::InvalidScope) error.
    pub fn invalid(scope: ScopeId, cause: InvalidCause) -> Self {
        Self::InvalidScope { scope, cause }
    }

    /// Whether this is an [`InvalidScope`](Self::InvalidScope) error.
    pub fn is_invalid_scope(&self) -> bool {
        matches!(self, Self::InvalidScope { .. })
    }

    /// Whether retrying the failed operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// The scope the error refers to.
    pub fn scope(&self) -> ScopeId {
        match self {
            Self::InvalidScope { scope, .. }
            | Self::StillForked { scope, .. }
            | Self::Overflow { scope, .. }
            | Self::Busy { scope, .. }
            | Self::Unsupported { scope, .. } => *scope,
        }
    }
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScope { scope, cause } => write!(f, "invalid scope {scope}: {cause}"),
            Self::StillForked { scope, forks } => {
                write!(f, "cannot close {scope}: {forks} fork(s) outstanding")
            }
            Self::Overflow { scope, max_forks } => {
                write!(f, "fork counter of {scope} exhausted (max {max_forks})")
            }
            Self::Busy { scope, pinned } => {
                write!(f, "cannot close {scope}: {pinned} access(es) in flight")
            }
            Self::Unsupported { scope, operation } => {
                write!(f, "operation '{operation}' not supported by {scope}")
            }
        }
    }
}

impl Error for ScopeError {}

/// Access kinds a handle may refuse regardless of scope state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnsupportedAccess {
    /// The handle is read-only and the access would write.
    Mode(AccessMode),
    /// Ownership handoff was requested on a handle without the capability.
    Handoff,
}

impl fmt::Display for UnsupportedAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode(mode) => write!(f, "{mode} access on a read-only segment"),
            Self::Handoff => write!(f, "segment does not permit ownership handoff"),
        }
    }
}

/// Errors from accessing or deriving a resource handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessError {
    /// The owning scope refused the access.
    Scope(ScopeError),
    /// `offset`/`length` fall outside the handle's region.
    OutOfBounds {
        /// Requested start offset.
        offset: usize,
        /// Requested length.
        length: usize,
        /// Length of the handle's region.
        region_len: usize,
    },
    /// The requested access is not permitted on this handle.
    Unsupported(UnsupportedAccess),
}

impl AccessError {
    /// Whether the underlying cause is an invalid (dead or foreign) scope.
    pub fn is_invalid_scope(&self) -> bool {
        matches!(self, Self::Scope(e) if e.is_invalid_scope())
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope(e) => write!(f, "scope: {e}"),
            Self::OutOfBounds {
                offset,
                length,
                region_len,
            } => write!(
                f,
                "out of bounds: offset {offset} length {length} in region of {region_len} bytes"
            ),
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Scope(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScopeError> for AccessError {
    fn from(e: ScopeError) -> Self {
        Self::Scope(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_the_only_retryable_error() {
        let id = ScopeId::next();
        assert!(ScopeError::Busy { scope: id, pinned: 1 }.is_retryable());
        assert!(!ScopeError::StillForked { scope: id, forks: 1 }.is_retryable());
        assert!(!ScopeError::invalid(id, InvalidCause::Closed).is_retryable());
    }

    #[test]
    fn access_error_chains_scope_source() {
        let id = ScopeId::next();
        let err: AccessError = ScopeError::invalid(id, InvalidCause::Closed).into();
        assert!(err.is_invalid_scope());
        assert!(err.source().is_some());
        assert!(err.to_string().contains("already closed"));
    }

    #[test]
    fn out_of_bounds_message_names_region() {
        let err = AccessError::OutOfBounds {
            offset: 10,
            length: 8,
            region_len: 12,
        };
        assert_eq!(
            err.to_string(),
            "out of bounds: offset 10 length 8 in region of 12 bytes"
        );
        assert!(!err.is_invalid_scope());
    }

    #[test]
    fn scope_accessor_matches_every_variant() {
        let id = ScopeId::next();
        let errors = [
            ScopeError::invalid(id, InvalidCause::Closing),
            ScopeError::StillForked { scope: id, forks: 2 },
            ScopeError::Overflow { scope: id, max_forks: 4 },
            ScopeError::Busy { scope: id, pinned: 1 },
            ScopeError::Unsupported {
                scope: id,
                operation: "close",
            },
        ];
        for e in &errors {
            assert_eq!(e.scope(), id);
        }
    }
}
