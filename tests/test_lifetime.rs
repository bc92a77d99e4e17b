use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use recycle_pool::{Handle, LockingPolicy, MutexLocking, NoLocking, Pool};

/// Counts how many resources have been destroyed.
struct Tracked {
    id: usize,
    dropped: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

fn tracked_pool(capacity: usize) -> (Pool<Tracked>, Arc<AtomicUsize>) {
    let dropped = Arc::new(AtomicUsize::new(0));
    let ids = Arc::new(AtomicUsize::new(0));
    let counter = dropped.clone();
    let pool = Pool::builder(move || Tracked {
        id: ids.fetch_add(1, Ordering::SeqCst),
        dropped: counter.clone(),
    })
    .capacity(capacity)
    .build();
    (pool, dropped)
}

#[test]
fn handles_outlive_pool() {
    let (pool, dropped) = tracked_pool(10);
    let a = pool.allocate();
    let b = pool.allocate();
    let b_clone = b.clone();
    drop(pool);

    assert_eq!(a.id, 0);
    assert_eq!(b_clone.id, 1);
    assert_eq!(dropped.load(Ordering::SeqCst), 0);

    drop(a);
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    drop(b);
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    drop(b_clone);
    assert_eq!(dropped.load(Ordering::SeqCst), 2);
}

#[test]
fn recycle_function_skipped_after_pool_dropped() {
    let recycled = Arc::new(AtomicUsize::new(0));
    let counter = recycled.clone();
    let pool: Pool<u32> = Pool::with_recycle(
        || 0,
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    let item = pool.allocate();
    drop(pool);
    drop(item);
    assert_eq!(recycled.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_pool_drops_idle_resources() {
    let (pool, dropped) = tracked_pool(10);
    let handles: Vec<_> = (0..3).map(|_| pool.allocate()).collect();
    drop(handles);
    assert_eq!(dropped.load(Ordering::SeqCst), 0);
    drop(pool);
    assert_eq!(dropped.load(Ordering::SeqCst), 3);
}

#[test]
fn overflow_and_free_unused_drop_resources() {
    let (pool, dropped) = tracked_pool(1);
    let a = pool.allocate();
    let b = pool.allocate();
    drop(a);
    drop(b);
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    assert_eq!(pool.unused_resources(), 1);

    pool.free_unused();
    assert_eq!(dropped.load(Ordering::SeqCst), 2);
}

/// A resource that can hold a handle from its own pool.
struct Node<L: LockingPolicy> {
    child: Option<Handle<Node<L>, L>>,
}

fn node_pool<L: LockingPolicy>() -> Pool<Node<L>, L> {
    Pool::builder(|| Node { child: None })
        .recycle_func(|node: &mut Node<L>| node.child = None)
        .build()
}

fn nested_release<L: LockingPolicy>() {
    let pool = node_pool::<L>();
    let leaf = pool.allocate();
    let parent = pool.allocate_with(|node| node.child = Some(leaf.clone()));
    drop(leaf);
    assert_eq!(pool.unused_resources(), 0);

    // Releasing the parent releases the leaf from inside the recycle function.
    drop(parent);
    assert_eq!(pool.unused_resources(), 2);

    let a = pool.allocate();
    let b = pool.allocate();
    assert!(a.child.is_none());
    assert!(b.child.is_none());
}

#[test]
fn nested_release_without_locking() {
    nested_release::<NoLocking>();
}

#[test]
fn nested_release_with_mutex() {
    nested_release::<MutexLocking>();
}

#[test]
fn idle_resource_holding_handle_dropped_with_pool() {
    // Without a recycle function the parent keeps its child while idle.
    let pool: Pool<Node<NoLocking>> = Pool::new(|| Node { child: None });
    let leaf = pool.allocate();
    let parent = pool.allocate_with(|node| node.child = Some(leaf.clone()));
    drop(leaf);
    drop(parent);
    assert_eq!(pool.unused_resources(), 1);

    // Tearing down the pool drops the parent, whose child then finds the pool
    // gone.
    drop(pool);
}

#[test]
fn free_unused_with_idle_resource_holding_handle() {
    let pool: Pool<Node<MutexLocking>, MutexLocking> = Pool::new(|| Node { child: None });
    let leaf = pool.allocate();
    let parent = pool.allocate_with(|node| node.child = Some(leaf.clone()));
    drop(leaf);
    drop(parent);
    assert_eq!(pool.unused_resources(), 1);

    // The idle parent is dropped outside the lock, so its child can go back
    // into the pool.
    pool.free_unused();
    assert_eq!(pool.unused_resources(), 1);
    assert!(pool.allocate().child.is_none());
}
