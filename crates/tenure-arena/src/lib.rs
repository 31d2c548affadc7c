//! Scope-bound native memory for Tenure.
//!
//! Provides [`MemorySegment`], a bounds- and lifetime-checked handle to
//! native memory, and bump arenas that batch many small allocations into
//! blocks owned by one [`Scope`](tenure_scope::Scope). All `unsafe` code
//! in this crate lives in the private `raw` module.
//!
//! # Architecture
//!
//! ```text
//! Scope (tenure-scope)
//! └── cleanup chain ── NativeBlock (freed on close)
//!                          ▲
//! MemorySegment ── Region ─┘  (scope check, bounds check, then access)
//!
//! Arena / BoundedArena            (&mut self, one scope)
//! SharedBoundedArena              (mutex around one block)
//! SharedUnboundedArena            (thread-local bump state per thread)
//! ```
//!
//! # Access paths
//!
//! Segments of a confined scope are touched with plain memory copies:
//! only the owner thread can pass the scope check. Segments of shared and
//! global scopes use relaxed per-byte atomics inside a pinned access
//! region, so concurrent readers and writers never race in the
//! undefined-behaviour sense and a concurrent close waits for them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod error;
pub mod native;
mod raw;
mod region;
pub mod scalar;
pub mod segment;
pub mod shared;

pub use arena::{Arena, BoundedArena};
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use native::{allocate_native, from_vec};
pub use scalar::Scalar;
pub use segment::MemorySegment;
pub use shared::{SharedBoundedArena, SharedUnboundedArena};
