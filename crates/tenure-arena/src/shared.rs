//! Arenas usable from many threads at once.
//!
//! [`SharedBoundedArena`] serializes allocation on a mutex around its one
//! block. [`SharedUnboundedArena`] avoids contention instead: each thread
//! bumps through blocks of its own, while every block belongs to the
//! arena's single shared scope.
//!
//! The arena owns every thread's bump state. Threads find theirs through
//! a thread-local table of weak references keyed by arena id, so the
//! table never keeps an arena's blocks or scope alive.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tenure_core::ScopeError;
use tenure_scope::Scope;

use crate::arena::{allocate_growing, check_layout, BumpState};
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::native::allocate_block;
use crate::segment::MemorySegment;

/// A bump arena over one block, safe to allocate from concurrently.
pub struct SharedBoundedArena {
    scope: Scope,
    bump: Mutex<BumpState>,
}

impl SharedBoundedArena {
    /// A `size`-byte arena over a new shared scope.
    pub fn new(size: usize) -> Result<Self, ArenaError> {
        Self::with_scope(size, ArenaConfig::DEFAULT_BLOCK_ALIGN, Scope::shared())
    }

    /// A `size`-byte arena aligned to `align` whose block belongs to
    /// `scope`.
    pub fn with_scope(size: usize, align: usize, scope: Scope) -> Result<Self, ArenaError> {
        let block = allocate_block(size, align, &scope)?;
        Ok(Self {
            scope,
            bump: Mutex::new(BumpState::new(block)),
        })
    }

    /// Allocate `size` zeroed bytes aligned to `align`.
    ///
    /// Fails with `Exhausted` once the block cannot hold the request.
    pub fn allocate(&self, size: usize, align: usize) -> Result<MemorySegment, ArenaError> {
        check_layout(size, align)?;
        let mut bump = self.bump.lock();
        bump.try_bump(size, align)?.ok_or(ArenaError::Exhausted {
            requested: size,
            available: bump.remaining(),
        })
    }

    /// Bytes left after the bump pointer, ignoring alignment padding.
    pub fn remaining(&self) -> usize {
        self.bump.lock().remaining()
    }

    /// The scope that owns the block.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Close the scope, freeing the block.
    pub fn close(&self) -> Result<(), ScopeError> {
        self.scope.close()
    }
}

/// A thread's bump state in one arena. Only that thread locks it, apart
/// from the arena dropping it.
type ThreadBump = Mutex<BumpState>;

/// Entries for the arenas the current thread has allocated from.
type LocalBumps = SmallVec<[(u64, Weak<ThreadBump>); 4]>;

thread_local! {
    static LOCAL_BUMPS: RefCell<LocalBumps> = RefCell::new(SmallVec::new());
}

/// A growable arena where each thread bumps through its own blocks.
///
/// All blocks, and all standalone allocations, belong to one shared scope;
/// closing it frees everything no matter which thread allocated it.
/// Dropping the arena releases every thread's bump state at once; the
/// dead thread-local entries are discarded the next time their thread
/// allocates from any shared arena.
pub struct SharedUnboundedArena {
    id: u64,
    scope: Scope,
    config: ArenaConfig,
    blocks: AtomicUsize,
    threads: Mutex<Vec<Arc<ThreadBump>>>,
}

impl SharedUnboundedArena {
    /// An arena over a new shared scope.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_scope(config, Scope::shared())
    }

    /// An arena whose blocks belong to `scope`.
    pub fn with_scope(config: ArenaConfig, scope: Scope) -> Result<Self, ArenaError> {
        static NEXT_ARENA: AtomicU64 = AtomicU64::new(0);
        config.validate()?;
        Ok(Self {
            id: NEXT_ARENA.fetch_add(1, Ordering::Relaxed),
            scope,
            config,
            blocks: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Allocate `size` zeroed bytes aligned to `align`.
    ///
    /// The first allocation on each thread opens that thread's first
    /// block. Errors are those of [`Arena::allocate`](crate::Arena::allocate).
    pub fn allocate(&self, size: usize, align: usize) -> Result<MemorySegment, ArenaError> {
        check_layout(size, align)?;
        let bump = match self.local_bump() {
            Some(bump) => bump,
            None => self.open_thread_bump()?,
        };
        let mut state = bump.lock();
        let grown = allocate_growing(&mut state, &self.config, &self.scope, size, align)?;
        if grown.new_block {
            self.blocks.fetch_add(1, Ordering::Relaxed);
        }
        Ok(grown.segment)
    }

    /// The calling thread's bump state in this arena, if it has one.
    ///
    /// The thread-local table is only borrowed for the lookup; it holds
    /// weak references, so pruning it never drops a scope.
    fn local_bump(&self) -> Option<Arc<ThreadBump>> {
        LOCAL_BUMPS
            .try_with(|cell| {
                let mut bumps = cell.borrow_mut();
                bumps.retain(|(_, bump)| bump.strong_count() > 0);
                bumps
                    .iter()
                    .find(|(id, _)| *id == self.id)
                    .and_then(|(_, bump)| bump.upgrade())
            })
            .ok()
            .flatten()
    }

    /// Open the calling thread's first block and register it.
    fn open_thread_bump(&self) -> Result<Arc<ThreadBump>, ArenaError> {
        let block = allocate_block(self.config.block_size, self.config.block_align, &self.scope)?;
        self.blocks.fetch_add(1, Ordering::Relaxed);
        let bump = Arc::new(Mutex::new(BumpState::new(block)));
        self.threads.lock().push(Arc::clone(&bump));
        LOCAL_BUMPS
            .try_with(|cell| cell.borrow_mut().push((self.id, Arc::downgrade(&bump))))
            .map_err(|_| ScopeError::Unsupported {
                scope: self.scope.id(),
                operation: "allocate during thread teardown",
            })?;
        Ok(bump)
    }

    /// Bump blocks allocated so far across all threads.
    pub fn block_count(&self) -> usize {
        self.blocks.load(Ordering::Relaxed)
    }

    /// The calling thread's bump offset, if it has allocated here.
    pub fn bump_offset(&self) -> Option<usize> {
        self.local_bump().map(|bump| bump.lock().sp())
    }

    /// The arena's configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// The scope that owns every block.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Close the scope, freeing every thread's blocks.
    pub fn close(&self) -> Result<(), ScopeError> {
        self.scope.close()
    }
}

// Compile-time assertion: both shared arenas can be shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SharedBoundedArena>();
    assert::<SharedUnboundedArena>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn bounded_allocations_are_disjoint() {
        let arena = Arc::new(SharedBoundedArena::new(8 * 64).unwrap());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let arena = Arc::clone(&arena);
                thread::spawn(move || {
                    let seg = arena.allocate(64, 8).unwrap();
                    seg.fill(i).unwrap();
                    seg
                })
            })
            .collect();
        let mut segments: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        segments.sort_by_key(MemorySegment::address);
        for pair in segments.windows(2) {
            assert!(pair[0].address() + 64 <= pair[1].address());
        }
        assert_eq!(arena.remaining(), 0);
        assert!(matches!(
            arena.allocate(1, 1),
            Err(ArenaError::Exhausted { requested: 1, available: 0 })
        ));
        arena.close().unwrap();
    }

    #[test]
    fn unbounded_gives_each_thread_its_own_block() {
        let arena = Arc::new(SharedUnboundedArena::new(ArenaConfig::default()).unwrap());
        assert_eq!(arena.block_count(), 0);
        assert_eq!(arena.bump_offset(), None);
        arena.allocate(10, 1).unwrap();
        assert_eq!(arena.bump_offset(), Some(10));

        let remote = Arc::clone(&arena);
        let offset = thread::spawn(move || {
            remote.allocate(100, 1).unwrap();
            remote.bump_offset()
        })
        .join()
        .unwrap();
        assert_eq!(offset, Some(100));
        assert_eq!(arena.bump_offset(), Some(10));
        assert_eq!(arena.block_count(), 2);
        arena.close().unwrap();
    }

    #[test]
    fn closed_unbounded_arena_refuses_allocation() {
        let arena = SharedUnboundedArena::new(ArenaConfig::default()).unwrap();
        let seg = arena.allocate(16, 8).unwrap();
        arena.close().unwrap();
        assert!(seg.to_vec().unwrap_err().is_invalid_scope());
        assert!(arena.allocate(16, 8).unwrap_err().is_invalid_scope());
        assert_eq!(arena.bump_offset(), Some(16));
    }

    #[test]
    fn unbounded_large_requests_are_standalone() {
        let arena = SharedUnboundedArena::new(ArenaConfig::default()).unwrap();
        arena.allocate(5000, 8).unwrap();
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.bump_offset(), Some(0));
        arena.close().unwrap();
    }
}
