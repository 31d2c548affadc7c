//! Lifetime scopes for native resources.
//!
//! A [`Scope`] bounds the lifetime of everything registered with it: when
//! the scope closes, its cleanup actions run exactly once, newest first,
//! and every later access through the scope fails with
//! [`ScopeError::InvalidScope`]. Closing is refused while forks are
//! outstanding, and a shared scope additionally waits until no thread is
//! mid-access before it frees anything.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cleanup`] | Lock-free LIFO chain of cleanup actions |
//! | [`confined`] | Scopes owned by one thread |
//! | [`shared`] | Scopes usable from any thread |
//! | [`quiesce`] | Per-thread access slots and the close barrier |
//! | [`scope`] | The [`Scope`] handle and [`AccessGuard`] |
//! | [`fork`] | [`ScopeFork`] keep-alive guards |
//! | [`builder`] | [`ScopeBuilder`] |
//! | [`config`] | [`ScopeConfig`] |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod builder;
pub mod cleanup;
pub mod config;
pub mod confined;
pub mod fork;
mod lifetime;
pub mod quiesce;
pub mod scope;
pub mod shared;
mod state;

pub use builder::ScopeBuilder;
pub use cleanup::{CleanupAction, CleanupChain, PendingCleanup};
pub use config::ScopeConfig;
pub use confined::ConfinedScope;
pub use fork::ScopeFork;
pub use lifetime::Attachment;
pub use scope::{AccessGuard, GlobalScope, Scope};
pub use shared::SharedScope;
pub use tenure_core::{InvalidCause, ScopeError, ScopeId, ScopeState};
