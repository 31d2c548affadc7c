//! Arena configuration parameters.

use crate::error::ArenaError;

/// Configuration for the unbounded arenas.
///
/// Validated by the arena constructors; immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Size in bytes of each bump block.
    ///
    /// Default: 4096. Must be non-zero.
    pub block_size: usize,

    /// Largest request served from a bump block.
    ///
    /// A request that does not fit the current block and is larger than
    /// this gets a standalone allocation instead of a fresh block.
    /// Default: 2048. Must not exceed `block_size`.
    pub max_alloc: usize,

    /// Alignment of each bump block.
    ///
    /// Default: 16. Must be a power of two.
    pub block_align: usize,
}

impl ArenaConfig {
    /// Default bump block size in bytes.
    pub const DEFAULT_BLOCK_SIZE: usize = 4096;

    /// Default large-allocation threshold in bytes.
    pub const DEFAULT_MAX_ALLOC: usize = Self::DEFAULT_BLOCK_SIZE / 2;

    /// Default block alignment.
    pub const DEFAULT_BLOCK_ALIGN: usize = 16;

    /// Create a config with default values.
    pub const fn new() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            max_alloc: Self::DEFAULT_MAX_ALLOC,
            block_align: Self::DEFAULT_BLOCK_ALIGN,
        }
    }

    /// Set the block size and a threshold of half of it.
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self.max_alloc = block_size / 2;
        self
    }

    /// Set the large-allocation threshold.
    pub const fn with_max_alloc(mut self, max_alloc: usize) -> Self {
        self.max_alloc = max_alloc;
        self
    }

    /// Set the block alignment.
    pub const fn with_block_align(mut self, block_align: usize) -> Self {
        self.block_align = block_align;
        self
    }

    /// Check the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns `ArenaError::InvalidConfig` if `block_size` is zero,
    /// `max_alloc` exceeds `block_size`, or `block_align` is not a power
    /// of two.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.block_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "block_size must be non-zero",
            });
        }
        if self.max_alloc > self.block_size {
            return Err(ArenaError::InvalidConfig {
                reason: "max_alloc must not exceed block_size",
            });
        }
        if !self.block_align.is_power_of_two() {
            return Err(ArenaError::InvalidConfig {
                reason: "block_align must be a power of two",
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new()
    }
}
