//! Tenure: scoped lifetimes for native memory.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Tenure sub-crates. For most users, adding `tenure` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use tenure::prelude::*;
//!
//! // A shared scope owns everything allocated against it.
//! let scope = Scope::shared();
//! let seg = allocate_native(64, 8, &scope).unwrap();
//! seg.set::<u32>(0, 7).unwrap();
//!
//! // Another thread keeps the scope open while it works.
//! let fork = scope.acquire().unwrap();
//! let remote = seg.clone();
//! let value = std::thread::spawn(move || {
//!     let value = remote.get::<u32>(0).unwrap();
//!     fork.release().unwrap();
//!     value
//! })
//! .join()
//! .unwrap();
//! assert_eq!(value, 7);
//!
//! // An arena batches small allocations into blocks of a confined scope.
//! let mut arena = Arena::new(ArenaConfig::default()).unwrap();
//! let name = arena.allocate_copy(b"tenure", 1).unwrap();
//! assert_eq!(name.to_vec().unwrap(), b"tenure");
//! arena.close().unwrap();
//!
//! // Closing frees the memory; every later access is refused.
//! scope.close().unwrap();
//! assert!(seg.get::<u32>(0).unwrap_err().is_invalid_scope());
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tenure-core` | Scope ids, states, access modes, error types |
//! | [`scope`] | `tenure-scope` | Cleanup chains, confined/shared/global scopes, forks |
//! | [`arena`] | `tenure-arena` | `MemorySegment`, native allocation, bump arenas |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and errors (`tenure-core`).
///
/// Contains [`types::ScopeId`], the packed [`types::ScopeState`], and the
/// error types every other crate returns ([`types::ScopeError`],
/// [`types::AccessError`]).
pub use tenure_core as types;

/// Lifetime scopes and cleanup chains (`tenure-scope`).
///
/// [`scope::Scope`] is the handle most code passes around; it wraps a
/// [`scope::ConfinedScope`], a [`scope::SharedScope`], or the process-wide
/// [`scope::GlobalScope`]. Build customised scopes with
/// [`scope::ScopeBuilder`].
pub use tenure_scope as scope;

/// Scope-bound native memory (`tenure-arena`).
///
/// Allocate standalone segments with [`arena::allocate_native`], or batch
/// them with [`arena::Arena`], [`arena::BoundedArena`],
/// [`arena::SharedBoundedArena`], and [`arena::SharedUnboundedArena`].
pub use tenure_arena as arena;

/// Common imports for typical Tenure usage.
///
/// ```rust
/// use tenure::prelude::*;
/// ```
///
/// This imports scopes and forks, segments, the arena types, and the
/// error types their operations return.
pub mod prelude {
    // Scopes
    pub use tenure_scope::{AccessGuard, Scope, ScopeBuilder, ScopeConfig, ScopeFork};

    // Core types
    pub use tenure_core::{AccessMode, ScopeId, ScopeState};

    // Errors
    pub use tenure_arena::ArenaError;
    pub use tenure_core::{AccessError, InvalidCause, ScopeError, UnsupportedAccess};

    // Memory
    pub use tenure_arena::{
        allocate_native, Arena, ArenaConfig, BoundedArena, MemorySegment, SharedBoundedArena,
        SharedUnboundedArena,
    };
}
