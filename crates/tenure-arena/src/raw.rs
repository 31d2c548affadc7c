//! Native blocks and the raw byte accesses on them.
//!
//! This is the only module in the crate that contains `unsafe` code. A
//! [`NativeBlock`] owns one allocation and frees it on drop; the block is
//! moved into a cleanup action of its scope, so it is freed exactly when
//! the scope closes. Segments refer to the memory through a [`BlockAddr`],
//! which carries the id of the owning scope.
//!
//! Every access takes the [`AccessGuard`] of that scope as a witness. A
//! guard is only handed out while the scope is alive, and for its whole
//! lifetime the block cannot be freed: a shared scope's close waits for
//! the guard's pin to disappear, and a confined scope can only be closed
//! by the thread that is busy performing the access.
//!
//! Accesses under an exclusive (confined) guard are plain copies. All
//! other accesses use relaxed per-byte atomics, so racing readers and
//! writers on a shared block see unspecified bytes but never undefined
//! behaviour.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU8, Ordering};

use tenure_core::ScopeId;
use tenure_scope::AccessGuard;
use tracing::trace;

use crate::error::ArenaError;

enum Backing {
    /// Allocated with `alloc_zeroed` for this layout.
    Heap(Layout),
    /// A `Box<[u8]>` of the block's length, leaked into the raw pointer.
    Boxed,
    /// Zero-sized; the pointer is dangling and never dereferenced.
    Empty,
}

/// An owned native allocation.
pub(crate) struct NativeBlock {
    ptr: NonNull<u8>,
    len: usize,
    backing: Backing,
}

// SAFETY: the block exclusively owns its allocation and holds no
// thread-affine state; moving it to another thread (into a cleanup action
// run by whichever thread closes the scope) is sound.
unsafe impl Send for NativeBlock {}

impl NativeBlock {
    /// Allocate `size` zeroed bytes aligned to `align`.
    pub(crate) fn zeroed(size: usize, align: usize) -> Result<Self, ArenaError> {
        let layout =
            Layout::from_size_align(size, align).map_err(|_| ArenaError::InvalidLayout { size, align })?;
        if size == 0 {
            let ptr = NonNull::new(ptr::without_provenance_mut::<u8>(align))
                .ok_or(ArenaError::InvalidLayout { size, align })?;
            return Ok(Self {
                ptr,
                len: 0,
                backing: Backing::Empty,
            });
        }
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        trace!(size, align, "native block allocated");
        Ok(Self {
            ptr,
            len: size,
            backing: Backing::Heap(layout),
        })
    }

    /// Take ownership of an existing byte buffer.
    pub(crate) fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        let raw = Box::into_raw(bytes.into_boxed_slice());
        // SAFETY: `Box::into_raw` never returns null.
        let ptr = unsafe { NonNull::new_unchecked(raw.cast::<u8>()) };
        Self {
            ptr,
            len,
            backing: Backing::Boxed,
        }
    }

    /// The address segments of `scope` use to reach this block.
    pub(crate) fn addr(&self, scope: ScopeId) -> BlockAddr {
        BlockAddr {
            ptr: self.ptr,
            len: self.len,
            scope,
        }
    }

    /// Give up ownership without freeing. Used for the global scope, which
    /// never runs cleanup.
    pub(crate) fn leak(self) {
        std::mem::forget(self);
    }
}

impl Drop for NativeBlock {
    fn drop(&mut self) {
        match self.backing {
            // SAFETY: allocated by `alloc_zeroed` with exactly this layout
            // and not freed before (drop runs once).
            Backing::Heap(layout) => unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) },
            // SAFETY: reconstitutes the box leaked in `from_vec`.
            Backing::Boxed => unsafe {
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                    self.ptr.as_ptr(),
                    self.len,
                )));
            },
            Backing::Empty => {}
        }
    }
}

/// Address of a native block, tagged with the scope that frees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockAddr {
    ptr: NonNull<u8>,
    len: usize,
    scope: ScopeId,
}

// SAFETY: a BlockAddr is only an address; every dereference goes through
// the methods below, which require a live AccessGuard of the owning scope.
unsafe impl Send for BlockAddr {}
// SAFETY: as above.
unsafe impl Sync for BlockAddr {}

impl BlockAddr {
    /// Numeric start address of the block.
    pub(crate) fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Length of the block in bytes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// The same block, now freed by `scope`.
    pub(crate) fn rebind(self, scope: ScopeId) -> Self {
        Self { scope, ..self }
    }

    /// Pointer to `offset`, after checking that `guard` belongs to the
    /// owning scope and that `[offset, offset + len)` lies in the block.
    ///
    /// # Panics
    ///
    /// Panics on a foreign guard or an out-of-block span. Callers check
    /// both before getting here, so either is a bug in this crate.
    fn span(&self, guard: &AccessGuard, offset: usize, len: usize) -> *mut u8 {
        assert_eq!(
            guard.scope(),
            self.scope,
            "access guard entered on a different scope"
        );
        assert!(
            offset <= self.len && len <= self.len - offset,
            "span {offset}+{len} outside native block of {} bytes",
            self.len
        );
        // SAFETY: `offset <= self.len`, so the result is within the
        // allocation or one past its end.
        unsafe { self.ptr.as_ptr().add(offset) }
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub(crate) fn read(&self, guard: &AccessGuard, offset: usize, dst: &mut [u8]) {
        let src = self.span(guard, offset, dst.len());
        if guard.is_exclusive() {
            // SAFETY: `src` is valid for `dst.len()` bytes (span check) and
            // the block is alive while `guard` is. `dst` is a distinct Rust
            // borrow, so the ranges cannot overlap.
            unsafe { ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
        } else {
            for (i, byte) in dst.iter_mut().enumerate() {
                // SAFETY: in bounds per the span check; shared blocks are
                // only ever accessed atomically while alive.
                *byte = unsafe { AtomicU8::from_ptr(src.add(i)) }.load(Ordering::Relaxed);
            }
        }
    }

    /// Copy `src` into the block starting at `offset`.
    pub(crate) fn write(&self, guard: &AccessGuard, offset: usize, src: &[u8]) {
        let dst = self.span(guard, offset, src.len());
        if guard.is_exclusive() {
            // SAFETY: as in `read`, with source and destination swapped.
            unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
        } else {
            for (i, byte) in src.iter().enumerate() {
                // SAFETY: as in `read`.
                unsafe { AtomicU8::from_ptr(dst.add(i)) }.store(*byte, Ordering::Relaxed);
            }
        }
    }

    /// Set `len` bytes starting at `offset` to `value`.
    pub(crate) fn fill(&self, guard: &AccessGuard, offset: usize, len: usize, value: u8) {
        let dst = self.span(guard, offset, len);
        if guard.is_exclusive() {
            // SAFETY: `dst` is valid for `len` bytes and the block is alive.
            unsafe { ptr::write_bytes(dst, value, len) };
        } else {
            for i in 0..len {
                // SAFETY: as in `read`.
                unsafe { AtomicU8::from_ptr(dst.add(i)) }.store(value, Ordering::Relaxed);
            }
        }
    }

    /// Copy `len` bytes from `src` at `src_offset` to `self` at `offset`.
    ///
    /// Overlapping ranges (same block) are handled like `memmove`.
    pub(crate) fn copy_from(
        &self,
        guard: &AccessGuard,
        offset: usize,
        src: &BlockAddr,
        src_guard: &AccessGuard,
        src_offset: usize,
        len: usize,
    ) {
        if guard.is_exclusive() && src_guard.is_exclusive() {
            let from = src.span(src_guard, src_offset, len);
            let to = self.span(guard, offset, len);
            // SAFETY: both spans are in bounds of live blocks; `ptr::copy`
            // permits overlap.
            unsafe { ptr::copy(from, to, len) };
        } else {
            let mut staging = vec![0u8; len];
            src.read(src_guard, src_offset, &mut staging);
            self.write(guard, offset, &staging);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_scope::Scope;

    #[test]
    fn zeroed_block_is_zero_and_aligned() {
        let scope = Scope::confined();
        let block = NativeBlock::zeroed(64, 64).unwrap();
        let addr = block.addr(scope.id());
        assert_eq!(addr.address() % 64, 0);
        let guard = scope.enter().unwrap();
        let mut out = [0xffu8; 64];
        addr.read(&guard, 0, &mut out);
        assert_eq!(out, [0u8; 64]);
    }

    #[test]
    fn bad_alignment_is_invalid_layout() {
        assert!(matches!(
            NativeBlock::zeroed(16, 3),
            Err(ArenaError::InvalidLayout { size: 16, align: 3 })
        ));
        assert!(NativeBlock::zeroed(16, 0).is_err());
    }

    #[test]
    fn empty_block_accepts_empty_access() {
        let scope = Scope::shared();
        let block = NativeBlock::zeroed(0, 8).unwrap();
        let addr = block.addr(scope.id());
        assert_eq!(addr.len(), 0);
        let guard = scope.enter().unwrap();
        addr.read(&guard, 0, &mut []);
        addr.write(&guard, 0, &[]);
    }

    #[test]
    fn shared_and_confined_paths_agree() {
        for scope in [Scope::confined(), Scope::shared()] {
            let block = NativeBlock::from_vec((0u8..32).collect());
            let addr = block.addr(scope.id());
            let guard = scope.enter().unwrap();
            addr.fill(&guard, 4, 4, 0xaa);
            addr.write(&guard, 0, &[9, 9]);
            addr.copy_from(&guard, 16, &addr, &guard, 0, 8);
            let mut out = [0u8; 24];
            addr.read(&guard, 0, &mut out);
            assert_eq!(&out[..8], &[9, 9, 2, 3, 0xaa, 0xaa, 0xaa, 0xaa]);
            assert_eq!(&out[16..], &out[..8]);
        }
    }

    #[test]
    fn overlapping_copy_behaves_like_memmove() {
        let scope = Scope::confined();
        let block = NativeBlock::from_vec((0u8..8).collect());
        let addr = block.addr(scope.id());
        let guard = scope.enter().unwrap();
        addr.copy_from(&guard, 2, &addr, &guard, 0, 6);
        let mut out = [0u8; 8];
        addr.read(&guard, 0, &mut out);
        assert_eq!(out, [0, 1, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    #[should_panic(expected = "different scope")]
    fn foreign_guard_is_rejected() {
        let owner = Scope::confined();
        let other = Scope::confined();
        let block = NativeBlock::zeroed(8, 8).unwrap();
        let addr = block.addr(owner.id());
        let guard = other.enter().unwrap();
        addr.read(&guard, 0, &mut [0u8; 1]);
    }
}
