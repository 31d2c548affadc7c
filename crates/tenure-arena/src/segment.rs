//! Scope-bound handles to native memory.
//!
//! A [`MemorySegment`] names a byte range of a native block together with
//! the [`Scope`] that frees the block. Every read, write, and slice first
//! validates the scope (alive, and owned by the caller if confined) and
//! then the range, so a segment can outlive its scope without ever
//! touching freed memory: all operations simply fail once the scope is
//! closed.

use std::fmt;
use std::thread::ThreadId;

use tenure_core::{AccessError, AccessMode, UnsupportedAccess};
use tenure_scope::{AccessGuard, Scope};
use tracing::debug;

use crate::raw::BlockAddr;
use crate::region::Region;
use crate::scalar::Scalar;

/// Chunk size used when comparing two segments.
const MISMATCH_CHUNK: usize = 256;

/// A bounds- and lifetime-checked view of native memory.
///
/// Cloning a segment is cheap and yields another view of the same bytes.
#[derive(Clone)]
pub struct MemorySegment {
    scope: Scope,
    region: Region,
    read_only: bool,
    handoff: bool,
}

impl MemorySegment {
    pub(crate) fn new(scope: Scope, block: BlockAddr, handoff: bool) -> Self {
        Self {
            scope,
            region: Region::whole(block),
            read_only: false,
            handoff,
        }
    }

    /// The scope that owns the memory.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Numeric address of the first byte. Stable for the segment's life.
    pub fn address(&self) -> usize {
        self.region.address()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.region.length
    }

    /// Whether the segment is zero bytes long.
    pub fn is_empty(&self) -> bool {
        self.region.length == 0
    }

    /// Whether writes through this segment are refused.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether [`with_new_owner`](Self::with_new_owner) is permitted.
    pub fn can_handoff(&self) -> bool {
        self.handoff
    }

    /// A view of the same bytes that refuses writes.
    pub fn as_read_only(&self) -> Self {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    /// A view of the same bytes that refuses ownership handoff.
    pub fn without_handoff(&self) -> Self {
        Self {
            handoff: false,
            ..self.clone()
        }
    }

    fn check_mode(&self, mode: AccessMode) -> Result<(), AccessError> {
        if mode.is_write() && self.read_only {
            return Err(AccessError::Unsupported(UnsupportedAccess::Mode(mode)));
        }
        Ok(())
    }

    /// Validate an access of `length` bytes at `offset` without performing
    /// it.
    ///
    /// # Errors
    ///
    /// - `Scope(InvalidScope)` if the scope is closed or, when confined,
    ///   the caller is not its owner.
    /// - `Unsupported` for a write through a read-only segment.
    /// - `OutOfBounds` if the range leaves the segment.
    #[inline]
    pub fn check_access(
        &self,
        offset: usize,
        length: usize,
        mode: AccessMode,
    ) -> Result<(), AccessError> {
        self.scope.check_valid()?;
        self.check_mode(mode)?;
        self.region.check_bounds(offset, length)
    }

    /// Validate an access and open an access region for it.
    fn enter(
        &self,
        offset: usize,
        length: usize,
        mode: AccessMode,
    ) -> Result<AccessGuard, AccessError> {
        let guard = self.scope.enter()?;
        self.check_mode(mode)?;
        self.region.check_bounds(offset, length)?;
        Ok(guard)
    }

    /// A segment over `length` bytes starting at `offset`, in the same
    /// scope. No memory is accessed.
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self, AccessError> {
        self.check_access(offset, length, AccessMode::Read)?;
        Ok(Self {
            region: self.region.sub(offset, length),
            ..self.clone()
        })
    }

    /// A segment from `offset` to the end.
    pub fn slice_from(&self, offset: usize) -> Result<Self, AccessError> {
        let length = self
            .len()
            .checked_sub(offset)
            .ok_or(AccessError::OutOfBounds {
                offset,
                length: 0,
                region_len: self.len(),
            })?;
        self.slice(offset, length)
    }

    /// Move the memory to a new confined scope owned by `new_owner`.
    ///
    /// The segment's scope is duplicated: every resource registered on it
    /// moves to the new scope and the old scope ends up closed, so this
    /// segment and every other view through the old scope become
    /// unusable. Returns a view of the same bytes in the new scope.
    ///
    /// # Errors
    ///
    /// - `Unsupported(Handoff)` if the segment lacks the capability.
    /// - `Scope(..)` if the scope refuses `dup`: it is shared or global,
    ///   closed, forked, or owned by another thread.
    pub fn with_new_owner(&self, new_owner: ThreadId) -> Result<Self, AccessError> {
        if !self.handoff {
            return Err(AccessError::Unsupported(UnsupportedAccess::Handoff));
        }
        let scope = self.scope.dup(new_owner)?;
        debug!(
            from = %self.scope.id(),
            to = %scope.id(),
            ?new_owner,
            bytes = self.len(),
            "segment handed off"
        );
        let region = Region {
            base: self.region.base.rebind(scope.id()),
            ..self.region
        };
        Ok(Self {
            scope,
            region,
            ..self.clone()
        })
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<(), AccessError> {
        let guard = self.enter(offset, dst.len(), AccessMode::Read)?;
        self.region
            .base
            .read(&guard, self.region.block_offset(offset), dst);
        Ok(())
    }

    /// Copy `src` into the segment starting at `offset`.
    pub fn write_from(&self, offset: usize, src: &[u8]) -> Result<(), AccessError> {
        let guard = self.enter(offset, src.len(), AccessMode::Write)?;
        self.region
            .base
            .write(&guard, self.region.block_offset(offset), src);
        Ok(())
    }

    /// Copy the whole segment into a new vector.
    pub fn to_vec(&self) -> Result<Vec<u8>, AccessError> {
        let mut out = vec![0u8; self.len()];
        self.read_into(0, &mut out)?;
        Ok(out)
    }

    /// Set every byte of the segment to `value`.
    pub fn fill(&self, value: u8) -> Result<(), AccessError> {
        let guard = self.enter(0, self.len(), AccessMode::Write)?;
        self.region
            .base
            .fill(&guard, self.region.block_offset(0), self.len(), value);
        Ok(())
    }

    /// Copy all of `src` to the start of this segment.
    ///
    /// The segments may overlap. Fails with `OutOfBounds` if `src` is
    /// longer than this segment.
    pub fn copy_from(&self, src: &MemorySegment) -> Result<(), AccessError> {
        let len = src.len();
        let guard = self.enter(0, len, AccessMode::Write)?;
        let src_guard = src.enter(0, len, AccessMode::Read)?;
        self.region.base.copy_from(
            &guard,
            self.region.block_offset(0),
            &src.region.base,
            &src_guard,
            src.region.block_offset(0),
            len,
        );
        Ok(())
    }

    /// Offset of the first byte that differs from `other`.
    ///
    /// Returns `None` if both segments have the same length and contents.
    /// If one is a prefix of the other, returns the shorter length.
    pub fn mismatch(&self, other: &MemorySegment) -> Result<Option<usize>, AccessError> {
        self.check_access(0, 0, AccessMode::Read)?;
        other.check_access(0, 0, AccessMode::Read)?;
        let common = self.len().min(other.len());
        let mut a = [0u8; MISMATCH_CHUNK];
        let mut b = [0u8; MISMATCH_CHUNK];
        let mut pos = 0;
        while pos < common {
            let n = (common - pos).min(MISMATCH_CHUNK);
            self.read_into(pos, &mut a[..n])?;
            other.read_into(pos, &mut b[..n])?;
            if let Some(i) = a[..n].iter().zip(&b[..n]).position(|(x, y)| x != y) {
                return Ok(Some(pos + i));
            }
            pos += n;
        }
        Ok((self.len() != other.len()).then_some(common))
    }

    /// Read a little-endian value at `offset`.
    pub fn get<T: Scalar>(&self, offset: usize) -> Result<T, AccessError> {
        let mut bytes = T::Bytes::default();
        self.read_into(offset, bytes.as_mut())?;
        Ok(T::decode_le(bytes))
    }

    /// Write a little-endian value at `offset`.
    pub fn set<T: Scalar>(&self, offset: usize, value: T) -> Result<(), AccessError> {
        self.write_from(offset, value.encode_le().as_ref())
    }
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySegment")
            .field("scope", &self.scope.id())
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

// Compile-time assertion: segments can be handed to other threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<MemorySegment>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{allocate_native, from_vec};
    use tenure_core::{InvalidCause, ScopeError};

    #[test]
    fn fresh_segment_is_zeroed() {
        let scope = Scope::confined();
        let seg = allocate_native(32, 8, &scope).unwrap();
        assert_eq!(seg.len(), 32);
        assert_eq!(seg.address() % 8, 0);
        assert_eq!(seg.to_vec().unwrap(), vec![0u8; 32]);
    }

    #[test]
    fn typed_access_is_little_endian() {
        let scope = Scope::confined();
        let seg = allocate_native(16, 8, &scope).unwrap();
        seg.set::<u32>(0, 0x0403_0201).unwrap();
        seg.set::<f64>(8, 1.5).unwrap();
        assert_eq!(&seg.to_vec().unwrap()[..4], &[1, 2, 3, 4]);
        assert_eq!(seg.get::<u16>(2).unwrap(), 0x0403);
        assert_eq!(seg.get::<f64>(8).unwrap(), 1.5);
        seg.set::<i8>(1, -1).unwrap();
        assert_eq!(seg.get::<u8>(1).unwrap(), 0xff);
    }

    #[test]
    fn out_of_bounds_reports_region() {
        let scope = Scope::confined();
        let seg = allocate_native(8, 1, &scope).unwrap();
        assert_eq!(
            seg.get::<u64>(1),
            Err(AccessError::OutOfBounds {
                offset: 1,
                length: 8,
                region_len: 8
            })
        );
        assert!(seg.slice(usize::MAX, 2).is_err());
        assert!(seg.slice_from(9).is_err());
        assert!(seg.slice_from(8).unwrap().is_empty());
    }

    #[test]
    fn slices_share_memory_and_scope() {
        let scope = Scope::confined();
        let seg = from_vec((0u8..16).collect(), &scope).unwrap();
        let tail = seg.slice(8, 8).unwrap();
        assert_eq!(tail.address(), seg.address() + 8);
        assert_eq!(tail.scope().id(), scope.id());
        tail.fill(0xee).unwrap();
        assert_eq!(seg.get::<u8>(8).unwrap(), 0xee);
        assert_eq!(seg.get::<u8>(7).unwrap(), 7);
        let inner = tail.slice_from(4).unwrap();
        assert_eq!(inner.len(), 4);
        assert_eq!(inner.address(), seg.address() + 12);
    }

    #[test]
    fn read_only_refuses_writes_only() {
        let scope = Scope::confined();
        let seg = allocate_native(4, 1, &scope).unwrap();
        let ro = seg.as_read_only();
        assert!(ro.is_read_only());
        assert_eq!(
            ro.write_from(0, &[1]),
            Err(AccessError::Unsupported(UnsupportedAccess::Mode(
                AccessMode::Write
            )))
        );
        assert!(ro.fill(1).is_err());
        seg.write_from(0, &[7]).unwrap();
        assert_eq!(ro.get::<u8>(0).unwrap(), 7);
        assert!(ro.slice(0, 2).unwrap().is_read_only());
    }

    #[test]
    fn closed_scope_fails_every_operation() {
        let scope = Scope::confined();
        let seg = allocate_native(8, 1, &scope).unwrap();
        let keep = seg.slice(0, 4).unwrap();
        scope.close().unwrap();
        let closed = AccessError::Scope(ScopeError::invalid(scope.id(), InvalidCause::Closed));
        assert_eq!(keep.to_vec(), Err(closed.clone()));
        assert_eq!(seg.slice(0, 1).unwrap_err(), closed);
        assert_eq!(seg.check_access(0, 1, AccessMode::Read), Err(closed));
        assert!(seg.set::<u8>(0, 1).unwrap_err().is_invalid_scope());
    }

    #[test]
    fn scope_error_takes_precedence_over_bounds() {
        let scope = Scope::confined();
        let seg = allocate_native(8, 1, &scope).unwrap();
        scope.close().unwrap();
        assert!(seg.read_into(100, &mut [0u8; 4]).unwrap_err().is_invalid_scope());
    }

    #[test]
    fn copy_and_mismatch() {
        let scope = Scope::confined();
        let a = from_vec(b"hello world".to_vec(), &scope).unwrap();
        let b = allocate_native(11, 1, &scope).unwrap();
        assert_eq!(a.mismatch(&b).unwrap(), Some(0));
        b.copy_from(&a).unwrap();
        assert_eq!(a.mismatch(&b).unwrap(), None);
        b.set::<u8>(6, b'W').unwrap();
        assert_eq!(a.mismatch(&b).unwrap(), Some(6));
        assert_eq!(a.mismatch(&a.slice(0, 5).unwrap()).unwrap(), Some(5));
        assert!(a.slice(0, 4).unwrap().copy_from(&a).is_err());
    }

    #[test]
    fn mismatch_spans_chunks() {
        let scope = Scope::shared();
        let a = allocate_native(1000, 1, &scope).unwrap();
        let b = allocate_native(1000, 1, &scope).unwrap();
        b.set::<u8>(777, 1).unwrap();
        assert_eq!(a.mismatch(&b).unwrap(), Some(777));
        scope.close().unwrap();
    }

    #[test]
    fn handoff_requires_capability() {
        let scope = Scope::confined();
        let seg = allocate_native(8, 1, &scope).unwrap();
        assert_eq!(
            seg.without_handoff()
                .with_new_owner(std::thread::current().id()),
            Err(AccessError::Unsupported(UnsupportedAccess::Handoff))
        );
        assert!(scope.is_alive());
    }

    #[test]
    fn handoff_to_same_thread_keeps_contents() {
        let scope = Scope::confined();
        let seg = from_vec(vec![1, 2, 3], &scope).unwrap();
        let moved = seg.with_new_owner(std::thread::current().id()).unwrap();
        assert!(seg.to_vec().unwrap_err().is_invalid_scope());
        assert_eq!(moved.to_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(moved.address(), seg.address());
        moved.scope().close().unwrap();
    }

    #[test]
    fn shared_segment_handoff_is_refused() {
        let scope = Scope::shared();
        let seg = allocate_native(8, 1, &scope).unwrap();
        assert!(matches!(
            seg.with_new_owner(std::thread::current().id()),
            Err(AccessError::Scope(ScopeError::Unsupported { .. }))
        ));
        seg.to_vec().unwrap();
        scope.close().unwrap();
    }

    #[test]
    fn access_while_holding_many_shared_guards() {
        use tenure_scope::quiesce::INLINE_PINS;

        let held: Vec<Scope> = (0..INLINE_PINS).map(|_| Scope::shared()).collect();
        let guards: Vec<AccessGuard> = held.iter().map(|s| s.enter().unwrap()).collect();

        let scope = Scope::shared();
        let src = allocate_native(16, 8, &scope).unwrap();
        let dst = allocate_native(16, 8, &scope).unwrap();
        src.set::<u64>(0, 0xfeed).unwrap();
        assert_eq!(src.get::<u64>(0).unwrap(), 0xfeed);
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.get::<u64>(0).unwrap(), 0xfeed);

        // Pins from the accesses above are gone; only the held guards remain.
        scope.close().unwrap();
        assert!(matches!(
            held[0].close_with_retry(1, std::time::Duration::ZERO),
            Err(ScopeError::Busy { .. })
        ));
        drop(guards);
        for s in &held {
            s.close().unwrap();
        }
    }
}
