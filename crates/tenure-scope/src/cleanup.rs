//! Lock-free chain of deferred cleanup actions.
//!
//! A [`CleanupChain`] is a Treiber stack of boxed actions. Pushing is a
//! CAS on the head pointer, so confined and shared scopes use the same
//! structure. Draining swaps the head for a poisoned sentinel; any push
//! that observes the sentinel is rejected and gets its action back, which
//! resolves "add vs. close" races without a lock.
//!
//! Actions run most-recently-added first.

#![allow(unsafe_code)]

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A deferred action registered on a scope.
pub type CleanupAction = Box<dyn FnOnce() + Send + 'static>;

struct CleanupNode {
    action: CleanupAction,
    next: *mut CleanupNode,
}

/// Address used as the "drained" head. Never dereferenced; a static has an
/// address no heap node can share.
static DRAINED_MARKER: u8 = 0;

fn drained() -> *mut CleanupNode {
    ptr::addr_of!(DRAINED_MARKER).cast_mut().cast()
}

/// A lock-free stack of cleanup actions, drained exactly once.
pub struct CleanupChain {
    head: AtomicPtr<CleanupNode>,
}

impl CleanupChain {
    /// Create an empty, undrained chain.
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Create a chain holding actions detached from another chain.
    pub fn from_pending(pending: PendingCleanup) -> Self {
        let head = pending.into_raw();
        Self {
            head: AtomicPtr::new(head),
        }
    }

    /// Push an action onto the chain.
    ///
    /// Returns the action back if the chain has already been drained.
    pub fn push(&self, action: CleanupAction) -> Result<(), CleanupAction> {
        let node = Box::into_raw(Box::new(CleanupNode {
            action,
            next: ptr::null_mut(),
        }));
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head == drained() {
                // SAFETY: `node` came from `Box::into_raw` above and was never
                // published, so we still own it exclusively.
                let node = unsafe { Box::from_raw(node) };
                return Err(node.action);
            }
            // SAFETY: `node` is unpublished until the CAS below succeeds.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => head = actual,
            }
        }
    }

    /// Whether the chain has been drained (or its actions taken).
    pub fn is_drained(&self) -> bool {
        self.head.load(Ordering::Acquire) == drained()
    }

    /// Detach every pending action and poison the chain.
    ///
    /// Returns `None` if the chain was already drained. The caller becomes
    /// responsible for the actions: run them, or move them to a new chain.
    pub fn take(&self) -> Option<PendingCleanup> {
        let head = self.head.swap(drained(), Ordering::AcqRel);
        if head == drained() {
            None
        } else {
            Some(PendingCleanup { head })
        }
    }

    /// Poison the chain and run every pending action, newest first.
    ///
    /// Returns the number of actions run; zero if already drained.
    pub fn drain(&self) -> usize {
        self.take().map_or(0, PendingCleanup::run)
    }
}

impl Default for CleanupChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CleanupChain {
    fn drop(&mut self) {
        // Actions never drained are dropped without running; owners drain
        // before letting the chain go.
        let head = *self.head.get_mut();
        if head != drained() {
            drop(PendingCleanup { head });
        }
    }
}

/// Actions detached from a [`CleanupChain`], owned by the caller.
///
/// Dropping a `PendingCleanup` without calling [`run`](Self::run) frees
/// the actions without executing them.
pub struct PendingCleanup {
    head: *mut CleanupNode,
}

// SAFETY: the list is uniquely owned and every action is `Send`.
unsafe impl Send for PendingCleanup {}

impl PendingCleanup {
    /// Number of detached actions.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            count += 1;
            // SAFETY: nodes reachable from an owned head are live boxes.
            cur = unsafe { (*cur).next };
        }
        count
    }

    /// Whether no actions were detached.
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Run every action exactly once, newest first.
    ///
    /// A panicking action does not prevent the remaining actions from
    /// running; the first panic is resumed after the chain is exhausted.
    pub fn run(self) -> usize {
        let mut cur = self.into_raw();
        let mut count = 0;
        let mut first_panic: Option<Box<dyn Any + Send>> = None;
        while !cur.is_null() {
            // SAFETY: we own the list; each node is visited and freed once.
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next;
            count += 1;
            let action = node.action;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        count
    }

    fn into_raw(self) -> *mut CleanupNode {
        let head = self.head;
        std::mem::forget(self);
        head
    }
}

impl Drop for PendingCleanup {
    fn drop(&mut self) {
        let mut cur = self.head;
        while !cur.is_null() {
            // SAFETY: we own the list; each node is freed once.
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next;
        }
    }
}
