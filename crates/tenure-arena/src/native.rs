//! Native allocations bound to a scope.
//!
//! Memory obtained here is freed by a cleanup action registered on the
//! scope, so it lives exactly as long as the scope does. Memory bound to
//! the global scope is never freed.

use tenure_scope::Scope;

use crate::error::ArenaError;
use crate::raw::NativeBlock;
use crate::segment::MemorySegment;

/// Allocate `size` zeroed bytes aligned to `align`, freed when `scope`
/// closes.
///
/// # Errors
///
/// - `InvalidLayout` if `align` is not a power of two or `size` is too
///   large for it.
/// - `Access(Scope(..))` if the scope refuses new cleanup: it is closed or,
///   when confined, owned by another thread.
///
/// ```
/// use tenure_arena::allocate_native;
/// use tenure_scope::Scope;
///
/// let scope = Scope::confined();
/// let seg = allocate_native(16, 8, &scope).unwrap();
/// seg.set::<u64>(0, 42).unwrap();
/// assert_eq!(seg.get::<u64>(0).unwrap(), 42);
/// scope.close().unwrap();
/// assert!(seg.get::<u64>(0).is_err());
/// ```
pub fn allocate_native(size: usize, align: usize, scope: &Scope) -> Result<MemorySegment, ArenaError> {
    bind(NativeBlock::zeroed(size, align)?, scope, true)
}

/// Move `bytes` into a segment freed when `scope` closes.
pub fn from_vec(bytes: Vec<u8>, scope: &Scope) -> Result<MemorySegment, ArenaError> {
    bind(NativeBlock::from_vec(bytes), scope, true)
}

/// Allocate a block for an arena. Arena blocks never permit handoff: it
/// would move the whole arena's scope.
pub(crate) fn allocate_block(
    size: usize,
    align: usize,
    scope: &Scope,
) -> Result<MemorySegment, ArenaError> {
    bind(NativeBlock::zeroed(size, align)?, scope, false)
}

fn bind(block: NativeBlock, scope: &Scope, handoff: bool) -> Result<MemorySegment, ArenaError> {
    let addr = block.addr(scope.id());
    if scope.is_global() {
        block.leak();
    } else {
        // On failure the rejected action, and the block with it, is dropped.
        scope.add_cleanup(move || drop(block))?;
    }
    Ok(MemorySegment::new(scope.clone(), addr, handoff))
}
