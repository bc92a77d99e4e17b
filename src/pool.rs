use std::fmt;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::cache::BlockCache;
use crate::lock::{Lockable, LockingPolicy, NoLocking};
use crate::{Builder, Handle};

/// Capacity of a pool when none is configured.
pub const DEFAULT_CAPACITY: usize = 10000;

pub(crate) type AllocateFn<T> = Arc<dyn Fn() -> T + Send + Sync>;
pub(crate) type RecycleFn<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// A recycling object pool.
///
/// `allocate` hands out a [`Handle`] to a resource. When the last clone of the
/// handle is dropped the resource is returned to the pool's free list, as long
/// as the free list is below capacity, and the next `allocate` reuses it
/// instead of calling the allocation function again.
///
/// Handles do not keep the pool alive. Dropping a pool while handles are
/// still out is fine: those resources are simply dropped when their handles
/// go away.
///
/// The locking policy `L` decides whether the pool can be shared between
/// threads. See [`NoLocking`] and [`MutexLocking`](crate::MutexLocking).
///
/// # Examples
///
/// ```rust
/// use recycle_pool::Pool;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let created = Arc::new(AtomicUsize::new(0));
/// let counter = created.clone();
/// let pool: Pool<Vec<u8>> = Pool::with_recycle(
///     move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///         Vec::with_capacity(1024)
///     },
///     Vec::clear,
/// );
///
/// let mut buf = pool.allocate();
/// buf.get_mut().unwrap().extend_from_slice(b"hello");
/// drop(buf);
/// assert_eq!(pool.unused_resources(), 1);
///
/// let buf = pool.allocate();
/// assert!(buf.is_empty());
/// assert_eq!(created.load(Ordering::Relaxed), 1);
/// ```
pub struct Pool<T, L: LockingPolicy = NoLocking> {
    core: Arc<PoolCore<T, L>>,
}

impl<T, L: LockingPolicy> Pool<T, L> {
    /// Create a pool with the default configuration that builds resources
    /// with `allocate`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::{Pool, DEFAULT_CAPACITY};
    ///
    /// let pool: Pool<String> = Pool::new(|| String::from("fresh"));
    /// assert_eq!(pool.capacity(), DEFAULT_CAPACITY);
    /// assert_eq!(*pool.allocate(), "fresh");
    /// ```
    pub fn new<F>(allocate: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::from_parts(Config::default(), Arc::new(allocate), None)
    }

    /// Create a pool with the default configuration that builds resources
    /// with `allocate` and passes every released resource to `recycle` before
    /// it is put back into the free list.
    ///
    /// `recycle` runs on the thread dropping the last handle and must not
    /// panic. A panic in `recycle` aborts the process.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<String> = Pool::with_recycle(String::new, String::clear);
    /// let item = pool.allocate_with(|s| s.push_str("Hello, World!"));
    /// assert_eq!(&*item, "Hello, World!");
    /// drop(item);
    /// let item2 = pool.allocate();
    /// assert_eq!(&*item2, "");
    /// ```
    pub fn with_recycle<F, R>(allocate: F, recycle: R) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::from_parts(Config::default(), Arc::new(allocate), Some(Arc::new(recycle)))
    }

    /// Create a pool with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.prealloc` is larger than `config.capacity`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::{Config, Pool};
    ///
    /// let config = Config { capacity: 4, prealloc: 2 };
    /// let pool: Pool<u64> = Pool::with_config(config, || 0);
    /// assert_eq!(pool.capacity(), 4);
    /// assert_eq!(pool.unused_resources(), 2);
    /// ```
    pub fn with_config<F>(config: Config, allocate: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::from_parts(config, Arc::new(allocate), None)
    }

    /// Start building a pool with custom configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<u32> = Pool::builder(|| 1).capacity(8).prealloc(3).build();
    /// assert_eq!(pool.capacity(), 8);
    /// assert_eq!(pool.unused_resources(), 3);
    /// ```
    pub fn builder<F>(allocate: F) -> Builder<T, L>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Builder::new(allocate)
    }

    pub(crate) fn from_parts(
        config: Config,
        allocate: AllocateFn<T>,
        recycle: Option<RecycleFn<T>>,
    ) -> Self {
        Self {
            core: Arc::new(PoolCore::new(config, allocate, recycle)),
        }
    }

    /// Get a resource from the pool.
    ///
    /// An idle resource is reused if there is one. Otherwise the allocation
    /// function is called, without holding the pool lock. A panic in the
    /// allocation function propagates to the caller and leaves the pool
    /// usable.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<u32> = Pool::new(|| 42);
    /// let item = pool.allocate();
    /// assert_eq!(*item, 42);
    /// ```
    pub fn allocate(&self) -> Handle<T, L> {
        self.core.allocate()
    }

    /// Get a resource from the pool and apply a function to it before
    /// handing it out.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<u32> = Pool::default();
    /// let item = pool.allocate_with(|x| *x = 42);
    /// assert_eq!(*item, 42);
    /// ```
    pub fn allocate_with<F>(&self, init: F) -> Handle<T, L>
    where
        F: FnOnce(&mut T),
    {
        let mut handle = self.core.allocate();
        // SAFETY: the handle was just created and has not been cloned.
        init(unsafe { handle.get_mut_unchecked() });
        handle
    }

    /// Get the number of idle resources in the free list.
    ///
    /// Other threads may allocate or release at any time, so the value can be
    /// stale as soon as it is returned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<u32> = Pool::default();
    /// assert_eq!(pool.unused_resources(), 0);
    /// let item = pool.allocate();
    /// drop(item);
    /// assert_eq!(pool.unused_resources(), 1);
    /// ```
    pub fn unused_resources(&self) -> usize {
        self.core.unused_resources()
    }

    /// Drop every idle resource and every cached handle block.
    ///
    /// Resources held by outstanding handles are not affected and still
    /// return to the pool when released.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<u32> = Pool::builder(|| 0).prealloc(5).build();
    /// assert_eq!(pool.unused_resources(), 5);
    /// pool.free_unused();
    /// assert_eq!(pool.unused_resources(), 0);
    /// ```
    pub fn free_unused(&self) {
        self.core.free_unused()
    }

    /// Get the capacity of the free list.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<u32> = Pool::with_capacity(10);
    /// assert_eq!(pool.capacity(), 10);
    /// ```
    pub fn capacity(&self) -> usize {
        self.core.capacity
    }
}

impl<T: Default + 'static, L: LockingPolicy> Pool<T, L> {
    /// Create a pool of default-constructed resources with the given
    /// capacity.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<Vec<u8>> = Pool::with_capacity(2);
    /// let a = pool.allocate();
    /// let b = pool.allocate();
    /// let c = pool.allocate();
    /// drop((a, b, c));
    /// assert_eq!(pool.unused_resources(), 2);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let config = Config {
            capacity,
            ..Default::default()
        };
        Self::with_config(config, T::default)
    }
}

impl<T: Default + 'static, L: LockingPolicy> Default for Pool<T, L> {
    fn default() -> Self {
        Self::new(T::default)
    }
}

impl<T, L: LockingPolicy> Clone for Pool<T, L> {
    /// Make an independent pool with the same functions and capacity.
    ///
    /// The new pool starts with as many idle resources as this pool has
    /// right now, built fresh with the allocation function. Nothing is shared
    /// between the two pools afterwards.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<u32> = Pool::builder(|| 5).prealloc(3).build();
    /// let copy = pool.clone();
    /// assert_eq!(copy.unused_resources(), 3);
    /// let _item = copy.allocate();
    /// assert_eq!(copy.unused_resources(), 2);
    /// assert_eq!(pool.unused_resources(), 3);
    /// ```
    fn clone(&self) -> Self {
        let config = Config {
            capacity: self.core.capacity,
            prealloc: self.unused_resources().min(self.core.capacity),
        };
        debug!(idle = config.prealloc, "copying pool");
        Self::from_parts(
            config,
            self.core.allocate.clone(),
            self.core.recycle.clone(),
        )
    }
}

impl<T, L: LockingPolicy> fmt::Debug for Pool<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.core.capacity)
            .field("unused_resources", &self.unused_resources())
            .field("recycle", &self.core.recycle.is_some())
            .finish()
    }
}

/// Shared state behind a [`Pool`] and the handles it issued.
///
/// Handles refer to it weakly, so its lifetime is tied to the `Pool` alone
/// (plus a short upgrade while a handle is being released).
///
/// This type is opaque. It is public only so that it can appear in the
/// `Send`/`Sync` bounds of [`Handle`]; it is not re-exported, has no public
/// fields or methods, and cannot be named or built outside this crate.
pub struct PoolCore<T, L: LockingPolicy> {
    /// Builds a resource when the free list is empty.
    allocate: AllocateFn<T>,
    /// Resets a released resource before it is reused.
    recycle: Option<RecycleFn<T>>,
    /// Maximum length of the free list and of the block cache.
    capacity: usize,
    state: L::Lock<State<T>>,
}

/// Everything guarded by the pool lock.
struct State<T> {
    /// Idle resources, reused last in first out.
    free: Vec<T>,
    /// Spare handle blocks.
    blocks: BlockCache,
}

impl<T, L: LockingPolicy> PoolCore<T, L> {
    fn new(config: Config, allocate: AllocateFn<T>, recycle: Option<RecycleFn<T>>) -> Self {
        let Config { capacity, prealloc } = config;
        assert!(
            prealloc <= capacity,
            "prealloc must be less than or equal to capacity"
        );

        let mut free = Vec::with_capacity(prealloc);
        for _ in 0..prealloc {
            free.push(allocate());
        }
        debug!(capacity, prealloc, "created pool");

        let state = State {
            free,
            blocks: BlockCache::new(Handle::<T, L>::block_layout(), capacity),
        };
        Self {
            allocate,
            recycle,
            capacity,
            state: <L::Lock<State<T>> as Lockable<State<T>>>::new(state),
        }
    }

    fn allocate(self: &Arc<Self>) -> Handle<T, L> {
        let reused = {
            let mut state = self.state.lock();
            let resource = state.free.pop();
            resource.map(|resource| (resource, state.blocks.take()))
        };

        let (resource, block) = match reused {
            Some((resource, block)) => {
                trace!(cached_block = block.is_some(), "reusing idle resource");
                (resource, block)
            }
            None => {
                trace!("free list empty, allocating resource");
                ((self.allocate)(), None)
            }
        };

        let block = block.unwrap_or_else(|| BlockCache::allocate(Handle::<T, L>::block_layout()));
        // SAFETY: the block is uninitialized, owned here, and has the handle
        // block layout.
        unsafe { Handle::new(block, Arc::downgrade(self), resource) }
    }

    /// Take back a resource whose last handle was dropped, along with the
    /// block that backed the handle.
    ///
    /// # Safety
    ///
    /// `block` must have the handle block layout and hold no live value.
    pub(crate) unsafe fn recycle(&self, block: NonNull<u8>, mut resource: T) {
        if let Some(recycle) = &self.recycle {
            // An implicit release has no caller to report a failure to.
            if catch_unwind(AssertUnwindSafe(|| recycle(&mut resource))).is_err() {
                error!("recycle function panicked, aborting");
                std::process::abort();
            }
        }

        let rejected = {
            let mut state = self.state.lock();
            // SAFETY: forwarded from the caller.
            unsafe { state.blocks.give_back(block) };
            if state.free.len() < self.capacity {
                state.free.push(resource);
                None
            } else {
                Some(resource)
            }
        };

        if let Some(resource) = rejected {
            trace!(capacity = self.capacity, "free list full, dropping resource");
            drop(resource);
        }
    }

    fn unused_resources(&self) -> usize {
        self.state.lock().free.len()
    }

    fn free_unused(&self) {
        let (free, blocks) = {
            let mut state = self.state.lock();
            let blocks = state.blocks.len();
            state.blocks.clear();
            (mem::take(&mut state.free), blocks)
        };
        debug!(resources = free.len(), blocks, "freed unused resources");
        drop(free);
    }
}

/// Configuration for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of idle resources kept for reuse. The same bound
    /// applies to cached handle blocks.
    pub capacity: usize,
    /// Number of resources built up front and placed in the free list.
    pub prealloc: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            prealloc: 0,
        }
    }
}
