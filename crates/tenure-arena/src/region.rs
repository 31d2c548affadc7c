//! Byte ranges within a native block.

use tenure_core::AccessError;

use crate::raw::BlockAddr;

/// `length` bytes starting `offset` bytes into a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Region {
    pub(crate) base: BlockAddr,
    pub(crate) offset: usize,
    pub(crate) length: usize,
}

impl Region {
    /// The whole block.
    pub(crate) fn whole(base: BlockAddr) -> Self {
        Self {
            base,
            offset: 0,
            length: base.len(),
        }
    }

    /// Numeric address of the first byte.
    pub(crate) fn address(&self) -> usize {
        self.base.address() + self.offset
    }

    /// Fail unless `[offset, offset + length)` lies within the region.
    ///
    /// Written so that no intermediate sum can overflow.
    #[inline]
    pub(crate) fn check_bounds(&self, offset: usize, length: usize) -> Result<(), AccessError> {
        if offset <= self.length && length <= self.length - offset {
            Ok(())
        } else {
            Err(AccessError::OutOfBounds {
                offset,
                length,
                region_len: self.length,
            })
        }
    }

    /// Sub-region relative to this one. Bounds must already be checked.
    pub(crate) fn sub(&self, offset: usize, length: usize) -> Self {
        debug_assert!(self.check_bounds(offset, length).is_ok());
        Self {
            base: self.base,
            offset: self.offset + offset,
            length,
        }
    }

    /// Block offset of a region-relative offset.
    pub(crate) fn block_offset(&self, offset: usize) -> usize {
        self.offset + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::NativeBlock;
    use proptest::prelude::*;
    use tenure_core::ScopeId;

    fn region(length: usize) -> (NativeBlock, Region) {
        let block = NativeBlock::zeroed(length, 1).unwrap();
        let region = Region::whole(block.addr(ScopeId::next()));
        (block, region)
    }

    #[test]
    fn huge_offsets_do_not_wrap() {
        let (_block, r) = region(16);
        assert!(r.check_bounds(usize::MAX, 2).is_err());
        assert!(r.check_bounds(8, usize::MAX).is_err());
        assert!(r.check_bounds(16, 0).is_ok());
        assert!(r.check_bounds(17, 0).is_err());
    }

    #[test]
    fn sub_region_offsets_compose() {
        let (_block, r) = region(64);
        let a = r.sub(8, 32);
        let b = a.sub(4, 4);
        assert_eq!(b.offset, 12);
        assert_eq!(b.address(), r.address() + 12);
        assert_eq!(b.block_offset(2), 14);
    }

    proptest! {
        #[test]
        fn bounds_match_wide_arithmetic(len in 0usize..256, offset in any::<usize>(), length in any::<usize>()) {
            let (_block, r) = region(len);
            let fits = (offset as u128) + (length as u128) <= len as u128;
            prop_assert_eq!(r.check_bounds(offset, length).is_ok(), fits);
        }
    }
}
