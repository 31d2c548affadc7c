//! Core types for the Tenure scoped-resource framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace: scope
//! identifiers, the scope lifecycle state, access modes, and the error
//! enums surfaced by scopes and resource handles.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod state;

pub use error::{AccessError, InvalidCause, ScopeError, UnsupportedAccess};
pub use id::{AccessMode, ScopeId};
pub use state::ScopeState;
