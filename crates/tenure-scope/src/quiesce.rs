//! Quiescence barrier for shared scopes.
//!
//! Every thread that accesses memory under a shared scope owns an
//! [`AccessSlot`] registered in a process-wide registry. An access pins
//! the scope id into the slot, re-checks the scope state, performs the
//! access, and unpins. A closing thread first publishes `Closing`, then
//! scans all slots: if no slot pins the scope, no access is in flight and
//! none can start, so the memory may be freed.
//!
//! Slots are padded to 128 bytes so that one thread's pin does not
//! invalidate the cache line another thread is pinning through.
//!
//! A slot has [`INLINE_PINS`] lock-free entries. Deeper nesting spills
//! into a mutex-guarded overflow list. The overflow push happens under the
//! same mutex the scan takes, so either the scan sees the pin or the
//! pinning thread's later state check sees the close.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tenure_core::ScopeId;

/// Number of pins a thread can hold before spilling into the slot's
/// overflow list.
pub const INLINE_PINS: usize = 4;

/// Sentinel stored in a pin entry that holds no scope. Scope ids start at 1.
const UNPINNED: u64 = 0;

/// Per-thread pin state, padded to avoid false sharing.
///
/// Only the owning thread writes the pin entries; closing threads read
/// them during the quiescence scan.
#[repr(align(128))]
pub struct AccessSlot {
    pins: [AtomicU64; INLINE_PINS],
    /// Scope ids pinned beyond the inline entries, one per pin.
    overflow: Mutex<Vec<u64>>,
    /// Set when the owning thread exits.
    retired: AtomicBool,
    /// Monotonic nanoseconds of the most recent unpin.
    last_quiesce_ns: AtomicU64,
    slot_id: u64,
}

// Compile-time assertion: AccessSlot must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<AccessSlot>();
};

impl AccessSlot {
    fn new(slot_id: u64) -> Self {
        Self {
            pins: Default::default(),
            overflow: Mutex::new(Vec::new()),
            retired: AtomicBool::new(false),
            last_quiesce_ns: AtomicU64::new(monotonic_nanos()),
            slot_id,
        }
    }

    /// Pin `scope` into a free inline entry, or the overflow list when
    /// every inline entry is taken.
    fn pin(&self, scope: ScopeId) -> PinEntry {
        match self
            .pins
            .iter()
            .position(|p| p.load(Ordering::Relaxed) == UNPINNED)
        {
            Some(index) => {
                self.pins[index].store(scope.get(), Ordering::SeqCst);
                PinEntry::Inline(index)
            }
            None => {
                self.overflow.lock().push(scope.get());
                PinEntry::Overflow
            }
        }
    }

    fn unpin(&self, scope: ScopeId, entry: PinEntry) {
        match entry {
            PinEntry::Inline(index) => self.pins[index].store(UNPINNED, Ordering::Release),
            PinEntry::Overflow => {
                let mut overflow = self.overflow.lock();
                if let Some(pos) = overflow.iter().rposition(|&id| id == scope.get()) {
                    overflow.swap_remove(pos);
                }
            }
        }
        self.last_quiesce_ns
            .store(monotonic_nanos(), Ordering::Release);
    }

    /// Whether any entry of this slot currently pins `scope`.
    pub fn is_pinning(&self, scope: ScopeId) -> bool {
        self.pins
            .iter()
            .any(|p| p.load(Ordering::SeqCst) == scope.get())
            || self.overflow.lock().contains(&scope.get())
    }

    /// Number of pins currently held through this slot.
    pub fn pinned_count(&self) -> usize {
        let inline = self
            .pins
            .iter()
            .filter(|p| p.load(Ordering::Acquire) != UNPINNED)
            .count();
        inline + self.overflow.lock().len()
    }

    /// Monotonic nanoseconds of the last unpin on this slot.
    pub fn last_quiesce_ns(&self) -> u64 {
        self.last_quiesce_ns.load(Ordering::Acquire)
    }

    /// Whether the owning thread has exited.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Process-wide registry of access slots.
struct SlotRegistry {
    slots: Mutex<IndexMap<u64, Arc<AccessSlot>>>,
    next_slot: AtomicU64,
}

impl SlotRegistry {
    fn global() -> &'static SlotRegistry {
        static REGISTRY: OnceLock<SlotRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| SlotRegistry {
            slots: Mutex::new(IndexMap::new()),
            next_slot: AtomicU64::new(0),
        })
    }

    fn register(&self) -> Arc<AccessSlot> {
        let slot_id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(AccessSlot::new(slot_id));
        self.slots.lock().insert(slot_id, Arc::clone(&slot));
        slot
    }

    fn deregister(&self, slot: &AccessSlot) {
        slot.retired.store(true, Ordering::Release);
        self.slots.lock().swap_remove(&slot.slot_id);
    }

    fn pinned_by(&self, scope: ScopeId) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.is_pinning(scope))
            .count()
    }
}

/// Thread-local handle that deregisters its slot when the thread exits.
struct LocalSlot {
    slot: Arc<AccessSlot>,
}

impl Drop for LocalSlot {
    fn drop(&mut self) {
        SlotRegistry::global().deregister(&self.slot);
    }
}

thread_local! {
    static LOCAL_SLOT: LocalSlot = LocalSlot {
        slot: SlotRegistry::global().register(),
    };
}

/// Where in its slot a pin is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PinEntry {
    Inline(usize),
    Overflow,
}

/// Proof that the current thread has `scope` pinned in its access slot.
///
/// Unpins on drop. Not `Send`: the pin lives in the creating thread's slot.
#[must_use]
pub struct PinGuard {
    scope: ScopeId,
    entry: PinEntry,
    _not_send: PhantomData<*const ()>,
}

impl PinGuard {
    /// The pinned scope.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let (scope, entry) = (self.scope, self.entry);
        // During thread teardown the slot may already be gone; the registry
        // entry was removed with it, so there is nothing left to unpin.
        let _ = LOCAL_SLOT.try_with(|local| local.slot.unpin(scope, entry));
    }
}

/// Pin `scope` in the current thread's access slot.
///
/// Nesting is unbounded; pins past [`INLINE_PINS`] take the slot's
/// overflow lock. Returns `None` if the thread-local slot has already
/// been destroyed (thread teardown).
pub fn pin(scope: ScopeId) -> Option<PinGuard> {
    let entry = LOCAL_SLOT.try_with(|local| local.slot.pin(scope)).ok()?;
    Some(PinGuard {
        scope,
        entry,
        _not_send: PhantomData,
    })
}

/// Number of threads currently pinning `scope`.
pub fn pinned_by(scope: ScopeId) -> usize {
    SlotRegistry::global().pinned_by(scope)
}

/// Wait until no thread pins `scope`, re-scanning up to `spin_limit` times.
///
/// Returns `Ok(())` once quiescent, or `Err(pinned)` with the number of
/// slots still pinning the scope after the budget is spent. The caller
/// must already have published a state that prevents new pins from
/// succeeding.
pub fn await_quiescent(scope: ScopeId, spin_limit: u32) -> Result<(), usize> {
    let registry = SlotRegistry::global();
    let mut pinned = registry.pinned_by(scope);
    let mut spins = 0u32;
    while pinned > 0 && spins < spin_limit {
        if spins % 64 == 63 {
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
        spins += 1;
        pinned = registry.pinned_by(scope);
    }
    if pinned == 0 {
        Ok(())
    } else {
        Err(pinned)
    }
}

/// Monotonic nanoseconds since an arbitrary process-local epoch.
///
/// NOT wall-clock time; only for relative comparisons.
pub(crate) fn monotonic_nanos() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    Instant::now().duration_since(*epoch).as_nanos() as u64
}
