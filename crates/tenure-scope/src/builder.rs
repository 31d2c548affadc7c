//! Builder for scopes that need more than the defaults.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::cleanup::{CleanupAction, CleanupChain};
use crate::config::ScopeConfig;
use crate::confined::ConfinedScope;
use crate::lifetime::Attachment;
use crate::scope::Scope;
use crate::shared::SharedScope;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Confined(ThreadId),
    Shared,
}

/// Configures and creates a confined or shared [`Scope`].
///
/// ```
/// use std::sync::Arc;
/// use tenure_scope::{Scope, ScopeConfig};
///
/// let scope = Scope::builder()
///     .shared()
///     .config(ScopeConfig::new().with_max_forks(16))
///     .attach(Arc::new(vec![0u8; 64]))
///     .on_close(|| println!("closed"))
///     .build();
/// assert!(scope.is_shared());
/// scope.close().unwrap();
/// ```
#[must_use]
pub struct ScopeBuilder {
    kind: Kind,
    config: ScopeConfig,
    attachment: Option<Attachment>,
    on_close: Vec<CleanupAction>,
}

impl ScopeBuilder {
    /// A builder for a scope confined to the calling thread.
    pub fn new() -> Self {
        Self {
            kind: Kind::Confined(thread::current().id()),
            config: ScopeConfig::default(),
            attachment: None,
            on_close: Vec::new(),
        }
    }

    /// Confine the scope to the calling thread.
    pub fn confined(mut self) -> Self {
        self.kind = Kind::Confined(thread::current().id());
        self
    }

    /// Confine the scope to `owner`.
    pub fn owner(mut self, owner: ThreadId) -> Self {
        self.kind = Kind::Confined(owner);
        self
    }

    /// Make the scope usable from any thread.
    pub fn shared(mut self) -> Self {
        self.kind = Kind::Shared;
        self
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep `value` alive until the scope closes, replacing any earlier
    /// attachment.
    pub fn attach<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.attachment = Some(value as Attachment);
        self
    }

    /// Register an action to run on close.
    ///
    /// Actions registered here run after every action added to the built
    /// scope, in reverse order among themselves.
    pub fn on_close(mut self, action: impl FnOnce() + Send + 'static) -> Self {
        self.on_close.push(Box::new(action));
        self
    }

    /// Create the scope.
    pub fn build(self) -> Scope {
        let cleanup = CleanupChain::new();
        for action in self.on_close {
            let pushed = cleanup.push(action);
            debug_assert!(pushed.is_ok(), "fresh cleanup chain rejected an action");
        }
        match self.kind {
            Kind::Confined(owner) => Scope::Confined(ConfinedScope::with_parts(
                owner,
                self.config,
                cleanup,
                self.attachment,
            )),
            Kind::Shared => Scope::Shared(SharedScope::with_parts(
                self.config,
                cleanup,
                self.attachment,
            )),
        }
    }
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
