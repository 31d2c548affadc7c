//! Bump arenas over scope-owned blocks.
//!
//! An arena carves many small allocations out of large native blocks that
//! all belong to one scope. Nothing is freed individually: closing the
//! scope frees every block at once.
//!
//! - [`Arena`] grows without bound. Requests larger than `max_alloc` get a
//!   standalone allocation; smaller ones that do not fit the current
//!   block open a fresh one.
//! - [`BoundedArena`] owns a single block and fails with
//!   [`ArenaError::Exhausted`] once it is full.

use tenure_core::{AccessError, ScopeError};
use tenure_scope::Scope;
use tracing::trace;

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::native::allocate_block;
use crate::segment::MemorySegment;

/// Round `addr` up to a multiple of `align` (a power of two).
fn align_up(addr: usize, align: usize) -> Option<usize> {
    addr.checked_add(align - 1).map(|a| a & !(align - 1))
}

/// Reject alignments that are zero or not a power of two.
pub(crate) fn check_layout(size: usize, align: usize) -> Result<(), ArenaError> {
    if align.is_power_of_two() {
        Ok(())
    } else {
        Err(ArenaError::InvalidLayout { size, align })
    }
}

/// A block and the bump pointer into it.
pub(crate) struct BumpState {
    block: MemorySegment,
    sp: usize,
}

impl BumpState {
    pub(crate) fn new(block: MemorySegment) -> Self {
        Self { block, sp: 0 }
    }

    pub(crate) fn sp(&self) -> usize {
        self.sp
    }

    pub(crate) fn remaining(&self) -> usize {
        self.block.len() - self.sp
    }

    /// Whether the block's scope is still alive.
    pub(crate) fn is_alive(&self) -> bool {
        self.block.scope().is_alive()
    }

    /// Block offset at which an aligned request of `size` bytes would
    /// start, if it fits.
    fn fit(&self, size: usize, align: usize) -> Option<usize> {
        let base = self.block.address();
        let start = align_up(base.checked_add(self.sp)?, align)? - base;
        let end = start.checked_add(size)?;
        (end <= self.block.len()).then_some(start)
    }

    /// Slice an aligned request out of the block and advance `sp`.
    ///
    /// `Ok(None)` if it does not fit; `sp` is then unchanged.
    pub(crate) fn try_bump(
        &mut self,
        size: usize,
        align: usize,
    ) -> Result<Option<MemorySegment>, AccessError> {
        let Some(start) = self.fit(size, align) else {
            return Ok(None);
        };
        let slice = self.block.slice(start, size)?;
        self.sp = start + size;
        Ok(Some(slice))
    }
}

/// Outcome of an allocation from a growable bump state.
pub(crate) struct Grown {
    pub(crate) segment: MemorySegment,
    pub(crate) new_block: bool,
}

/// The unbounded allocation policy shared by [`Arena`] and
/// [`SharedUnboundedArena`](crate::SharedUnboundedArena).
///
/// Requests larger than `max_alloc`, or more strictly aligned than the
/// blocks, always get a standalone allocation and leave the bump pointer
/// untouched. Everything else is sliced from the current block, or from a
/// fresh one if it does not fit. The retry in a fresh block always
/// succeeds: it starts at offset 0 of a block aligned at least as
/// strictly, and `size <= max_alloc <= block_size`.
pub(crate) fn allocate_growing(
    bump: &mut BumpState,
    config: &ArenaConfig,
    scope: &Scope,
    size: usize,
    align: usize,
) -> Result<Grown, ArenaError> {
    check_layout(size, align)?;
    if size > config.max_alloc || align > config.block_align {
        trace!(scope = %scope.id(), size, align, "standalone arena allocation");
        return Ok(Grown {
            segment: allocate_block(size, align, scope)?,
            new_block: false,
        });
    }
    if let Some(segment) = bump.try_bump(size, align)? {
        return Ok(Grown {
            segment,
            new_block: false,
        });
    }
    *bump = BumpState::new(allocate_block(config.block_size, config.block_align, scope)?);
    trace!(scope = %scope.id(), block_size = config.block_size, "arena block allocated");
    match bump.try_bump(size, align)? {
        Some(segment) => Ok(Grown {
            segment,
            new_block: true,
        }),
        None => panic!(
            "arena invariant violated: fresh {}-byte block cannot hold {size} bytes aligned to {align}",
            config.block_size
        ),
    }
}

/// A growable bump arena over one scope.
///
/// The arena is `Send` but not shared: allocation takes `&mut self`.
/// Segments it hands out are views into the arena's blocks and stay valid
/// until the scope closes.
///
/// ```
/// use tenure_arena::{Arena, ArenaConfig};
///
/// let mut arena = Arena::new(ArenaConfig::default()).unwrap();
/// let a = arena.allocate(100, 8).unwrap();
/// let b = arena.allocate_copy(b"tenure", 1).unwrap();
/// a.fill(1).unwrap();
/// assert_eq!(b.to_vec().unwrap(), b"tenure");
/// arena.close().unwrap();
/// assert!(a.to_vec().is_err());
/// ```
pub struct Arena {
    scope: Scope,
    config: ArenaConfig,
    bump: BumpState,
    blocks: usize,
}

impl Arena {
    /// An arena over a new scope confined to the calling thread.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_scope(config, Scope::confined())
    }

    /// An arena whose blocks belong to `scope`.
    ///
    /// The first block is allocated immediately.
    pub fn with_scope(config: ArenaConfig, scope: Scope) -> Result<Self, ArenaError> {
        config.validate()?;
        let block = allocate_block(config.block_size, config.block_align, &scope)?;
        trace!(scope = %scope.id(), block_size = config.block_size, "arena created");
        Ok(Self {
            scope,
            config,
            bump: BumpState::new(block),
            blocks: 1,
        })
    }

    /// Allocate `size` zeroed bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// - `InvalidLayout` if `align` is not a power of two.
    /// - `Access(Scope(..))` if the scope is closed or, when confined,
    ///   owned by another thread.
    ///
    /// # Panics
    ///
    /// Never for a validated configuration; a request that cannot fit a
    /// fresh block is served standalone instead.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<MemorySegment, ArenaError> {
        let grown = allocate_growing(&mut self.bump, &self.config, &self.scope, size, align)?;
        if grown.new_block {
            self.blocks += 1;
        }
        Ok(grown.segment)
    }

    /// Allocate a copy of `bytes` aligned to `align`.
    pub fn allocate_copy(&mut self, bytes: &[u8], align: usize) -> Result<MemorySegment, ArenaError> {
        let segment = self.allocate(bytes.len(), align)?;
        segment.write_from(0, bytes)?;
        Ok(segment)
    }

    /// Number of bump blocks allocated so far. Standalone allocations are
    /// not counted.
    pub fn block_count(&self) -> usize {
        self.blocks
    }

    /// Offset of the bump pointer in the current block.
    pub fn bump_offset(&self) -> usize {
        self.bump.sp()
    }

    /// The arena's configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// The scope that owns every block.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Close the scope, freeing every block and standalone allocation.
    pub fn close(&self) -> Result<(), ScopeError> {
        self.scope.close()
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("scope", &self.scope.id())
            .field("blocks", &self.blocks)
            .field("sp", &self.bump.sp())
            .finish()
    }
}

/// A bump arena over a single fixed block.
pub struct BoundedArena {
    scope: Scope,
    bump: BumpState,
}

impl BoundedArena {
    /// A `size`-byte arena over a new scope confined to the calling thread.
    pub fn new(size: usize) -> Result<Self, ArenaError> {
        Self::with_scope(size, ArenaConfig::DEFAULT_BLOCK_ALIGN, Scope::confined())
    }

    /// A `size`-byte arena aligned to `align` whose block belongs to
    /// `scope`.
    pub fn with_scope(size: usize, align: usize, scope: Scope) -> Result<Self, ArenaError> {
        let block = allocate_block(size, align, &scope)?;
        Ok(Self {
            scope,
            bump: BumpState::new(block),
        })
    }

    /// Allocate `size` zeroed bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// `Exhausted` if the rest of the block cannot hold the request, in
    /// addition to the errors of [`Arena::allocate`].
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<MemorySegment, ArenaError> {
        check_layout(size, align)?;
        self.bump
            .try_bump(size, align)?
            .ok_or(ArenaError::Exhausted {
                requested: size,
                available: self.bump.remaining(),
            })
    }

    /// Allocate a copy of `bytes` aligned to `align`.
    pub fn allocate_copy(&mut self, bytes: &[u8], align: usize) -> Result<MemorySegment, ArenaError> {
        let segment = self.allocate(bytes.len(), align)?;
        segment.write_from(0, bytes)?;
        Ok(segment)
    }

    /// Bytes left after the bump pointer, ignoring alignment padding.
    pub fn remaining(&self) -> usize {
        self.bump.remaining()
    }

    /// Offset of the bump pointer.
    pub fn bump_offset(&self) -> usize {
        self.bump.sp()
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
