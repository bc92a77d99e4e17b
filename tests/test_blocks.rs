//! Handle blocks are cached by the pool, so a warm allocate/release cycle
//! never reaches the global allocator.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use recycle_pool::{LockingPolicy, MutexLocking, NoLocking, Pool};

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    static DEALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    // Ignored during thread teardown.
    let _ = counter.try_with(|count| count.set(count.get() + 1));
}

/// Counts heap operations per thread and forwards them to the system allocator.
struct CountingAllocator;

// SAFETY: every call is forwarded to `System` unchanged.
unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        bump(&ALLOCATIONS);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        bump(&DEALLOCATIONS);
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        bump(&ALLOCATIONS);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        bump(&ALLOCATIONS);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

/// Heap allocations and deallocations made by this thread while `f` runs.
fn heap_ops(f: impl FnOnce()) -> (usize, usize) {
    let allocs = ALLOCATIONS.with(Cell::get);
    let deallocs = DEALLOCATIONS.with(Cell::get);
    f();
    (
        ALLOCATIONS.with(Cell::get) - allocs,
        DEALLOCATIONS.with(Cell::get) - deallocs,
    )
}

fn allocations(f: impl FnOnce()) -> usize {
    heap_ops(f).0
}

fn cycle<L: LockingPolicy>(pool: &Pool<u32, L>, rounds: usize) {
    for _ in 0..rounds {
        drop(pool.allocate());
    }
}

fn warm_cycles_do_not_allocate<L: LockingPolicy>() {
    let pool: Pool<u32, L> = Pool::new(|| 7);
    // First cycles build the resource, the block and the pool's vectors.
    cycle(&pool, 10);

    assert_eq!(allocations(|| cycle(&pool, 1000)), 0);
    assert_eq!(pool.unused_resources(), 1);
}

#[test]
fn warm_cycles_do_not_allocate_without_locking() {
    warm_cycles_do_not_allocate::<NoLocking>();
}

#[test]
fn warm_cycles_do_not_allocate_with_mutex() {
    warm_cycles_do_not_allocate::<MutexLocking>();
}

#[test]
fn preallocated_resource_still_needs_a_block() {
    // Warm up logging callsites on a throwaway pool.
    cycle(&Pool::<u32>::new(|| 0), 10);

    let pool: Pool<u32> = Pool::builder(|| 0).prealloc(4).build();
    let mut first = None;
    assert_eq!(allocations(|| first = Some(pool.allocate())), 1);
    drop(first);

    assert_eq!(allocations(|| cycle(&pool, 1000)), 0);
    assert_eq!(pool.unused_resources(), 4);
}

#[test]
fn free_unused_releases_cached_blocks() {
    let pool: Pool<u32, MutexLocking> = Pool::new(|| 0);
    let held: Vec<_> = (0..3).map(|_| pool.allocate()).collect();
    drop(held);
    cycle(&pool, 10);

    let (_, deallocs) = heap_ops(|| pool.free_unused());
    assert!(deallocs >= 3, "only {deallocs} deallocations");
    assert_eq!(pool.unused_resources(), 0);

    // The next hit has to go to the allocator for its block again.
    assert!(allocations(|| cycle(&pool, 1)) > 0);
    assert_eq!(allocations(|| cycle(&pool, 1000)), 0);
}
