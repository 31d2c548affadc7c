//! Benchmark fixtures for the Tenure scoped-memory crates.
//!
//! - [`scope_of`]: a fresh scope of the requested [`Sharing`]
//! - [`filled_segment`]: a native segment with a deterministic byte pattern
//! - [`reference_arena`]: an unbounded arena pre-warmed to a number of blocks

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use tenure_arena::{allocate_native, Arena, ArenaConfig, MemorySegment};
use tenure_scope::Scope;

/// Which kind of scope a benchmark runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sharing {
    /// Owned by the benchmarking thread.
    Confined,
    /// Accessible from any thread.
    Shared,
}

impl Sharing {
    /// Both kinds, for parameterized benchmark groups.
    pub const ALL: [Sharing; 2] = [Sharing::Confined, Sharing::Shared];

    /// Short label for benchmark ids.
    pub fn label(self) -> &'static str {
        match self {
            Sharing::Confined => "confined",
            Sharing::Shared => "shared",
        }
    }
}

/// A fresh open scope of the given kind.
pub fn scope_of(sharing: Sharing) -> Scope {
    match sharing {
        Sharing::Confined => Scope::confined(),
        Sharing::Shared => Scope::shared(),
    }
}

/// A `len`-byte segment of `scope` where byte `i` holds `(i * 31 + seed) as u8`.
///
/// # Panics
///
/// Panics if `scope` cannot take the allocation.
pub fn filled_segment(scope: &Scope, len: usize, seed: u8) -> MemorySegment {
    let bytes: Vec<u8> = (0..len)
        .map(|i| (i.wrapping_mul(31) as u8).wrapping_add(seed))
        .collect();
    let seg = allocate_native(len, 8, scope).expect("benchmark scope must accept allocations");
    seg.write_from(0, &bytes).expect("benchmark segment must be writable");
    seg
}

/// An arena with the default configuration that already holds `blocks`
/// bump blocks, so timing excludes first-block setup.
///
/// # Panics
///
/// Panics if the arena cannot be built.
pub fn reference_arena(blocks: usize) -> Arena {
    let config = ArenaConfig::default();
    let mut arena = Arena::new(config).expect("default arena config is valid");
    while arena.block_count() < blocks {
        arena
            .allocate(config.max_alloc, 1)
            .expect("warm-up allocation fits");
    }
    arena
}
