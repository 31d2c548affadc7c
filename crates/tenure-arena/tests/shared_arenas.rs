//! Shared arenas under concurrent allocation and a racing close.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tenure_arena::{ArenaConfig, SharedBoundedArena, SharedUnboundedArena};
use tenure_scope::Scope;
use tenure_test_utils::fixtures::Worker;
use tenure_test_utils::CleanupCounter;

/// Number of allocating threads.
const THREADS: usize = 8;

/// Allocations per thread.
const PER_THREAD: usize = 500;

#[test]
fn unbounded_arena_serves_many_threads() {
    let arena = Arc::new(SharedUnboundedArena::new(ArenaConfig::default()).unwrap());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let arena = Arc::clone(&arena);
            thread::spawn(move || {
                let mut segments = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let seg = arena.allocate(8 + i % 32, 8).unwrap();
                    seg.set::<u64>(0, (t * PER_THREAD + i) as u64).unwrap();
                    segments.push(seg);
                }
                for (i, seg) in segments.iter().enumerate() {
                    assert_eq!(seg.get::<u64>(0).unwrap(), (t * PER_THREAD + i) as u64);
                }
                segments
            })
        })
        .collect();
    let segments: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    // Every thread's values survive everyone else's allocations.
    for (n, seg) in segments.iter().enumerate() {
        assert_eq!(seg.get::<u64>(0).unwrap(), n as u64);
    }
    assert!(arena.block_count() >= THREADS);

    arena.close().unwrap();
    assert!(segments.iter().all(|s| s.to_vec().is_err()));
}

#[test]
fn close_waits_for_in_flight_access() {
    let arena = Arc::new(SharedBoundedArena::new(1 << 16).unwrap());
    let seg = arena.allocate(1 << 15, 8).unwrap();
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);

    let reader = {
        let seg = seg.clone();
        thread::spawn(move || {
            started_tx.send(()).unwrap();
            let mut reads = 0usize;
            while seg.to_vec().is_ok() {
                reads += 1;
            }
            reads
        })
    };
    started_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(5));

    arena
        .scope()
        .close_with_retry(1_000, Duration::from_micros(100))
        .unwrap();
    let reads = reader.join().unwrap();
    assert!(reads > 0);
    assert!(seg.fill(1).unwrap_err().is_invalid_scope());
}

#[test]
fn dropping_unclosed_arena_releases_other_threads_blocks() {
    let counter = CleanupCounter::new();
    let scope = Scope::builder().shared().on_close(counter.action()).build();
    let arena = Arc::new(SharedUnboundedArena::with_scope(ArenaConfig::default(), scope).unwrap());

    let worker = Worker::spawn();
    let remote = Arc::clone(&arena);
    worker.run(move || {
        remote.allocate(16, 8).unwrap();
    });
    assert_eq!(arena.block_count(), 1);
    assert_eq!(counter.runs(), 0);

    drop(arena);
    assert_eq!(counter.runs(), 1);

    // The worker's stale table entry must not get in the way of new arenas.
    let offset = worker.run(|| {
        let fresh = SharedUnboundedArena::new(ArenaConfig::default()).unwrap();
        fresh.allocate(24, 8).unwrap();
        let offset = fresh.bump_offset();
        fresh.close().unwrap();
        offset
    });
    assert_eq!(offset, Some(24));
}

#[test]
fn cleanup_run_by_arena_drop_may_allocate() {
    let counter = CleanupCounter::new();
    let done = counter.action();
    let scope = Scope::builder()
        .shared()
        .on_close(move || {
            let other = SharedUnboundedArena::new(ArenaConfig::default()).unwrap();
            other.allocate(32, 8).unwrap();
            other.close().unwrap();
            done();
        })
        .build();
    let arena = SharedUnboundedArena::with_scope(ArenaConfig::default(), scope).unwrap();
    arena.allocate(16, 8).unwrap();
    assert_eq!(arena.bump_offset(), Some(16));

    drop(arena);
    assert_eq!(counter.runs(), 1);
}
