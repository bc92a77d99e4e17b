use std::alloc::Layout;
use std::borrow::Borrow;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::Weak;
use std::sync::atomic::Ordering::*;
use std::sync::atomic::{AtomicUsize, fence};

use tracing::trace;

use crate::cache::BlockCache;
use crate::lock::{LockingPolicy, NoLocking};
use crate::pool::PoolCore;

/// Clones beyond this count abort the process, as with `Arc`.
const MAX_REFCOUNT: usize = isize::MAX as usize;

/// A shared handle to a resource allocated from a [`Pool`](crate::Pool).
///
/// Cloning a `Handle` shares the same resource. When the last clone is
/// dropped the resource goes back to the pool it came from, or is dropped if
/// that pool no longer exists.
///
/// A handle only holds a weak reference to its pool, so outstanding handles
/// never keep a pool alive.
///
/// # Example
///
/// ```rust
/// use recycle_pool::Pool;
///
/// let pool: Pool<u32> = Pool::new(|| 7);
/// let item = pool.allocate();
/// let item_clone = item.clone();
/// assert_eq!(*item_clone, 7);
/// drop(item);
/// assert_eq!(pool.unused_resources(), 0);
/// drop(item_clone);
/// assert_eq!(pool.unused_resources(), 1);
/// ```
pub struct Handle<T, L: LockingPolicy = NoLocking> {
    ptr: NonNull<Shared<T, L>>,
    _marker: PhantomData<Shared<T, L>>,
}

/// The metadata block behind every clone of a handle.
///
/// Blocks are recycled through the pool's [`BlockCache`], so the memory of
/// this struct is allocated with [`Handle::block_layout`].
struct Shared<T, L: LockingPolicy> {
    count: AtomicUsize,
    pool: Weak<PoolCore<T, L>>,
    resource: T,
}

// A handle shares `&T` between clones and may move `T` to whichever thread
// drops the last clone. Dropping that clone also touches the pool.
unsafe impl<T, L> Send for Handle<T, L>
where
    T: Send + Sync,
    L: LockingPolicy,
    PoolCore<T, L>: Send + Sync,
{
}

unsafe impl<T, L> Sync for Handle<T, L>
where
    T: Send + Sync,
    L: LockingPolicy,
    PoolCore<T, L>: Send + Sync,
{
}

impl<T, L: LockingPolicy> Handle<T, L> {
    /// Layout of the block backing a handle.
    pub(crate) fn block_layout() -> Layout {
        Layout::new::<Shared<T, L>>()
    }

    /// Move `resource` into `block` and wrap it as a handle with one
    /// reference.
    ///
    /// # Safety
    ///
    /// `block` must be an uninitialized block of [`block_layout`](Self::block_layout)
    /// owned by the caller.
    pub(crate) unsafe fn new(block: NonNull<u8>, pool: Weak<PoolCore<T, L>>, resource: T) -> Self {
        let ptr = block.cast::<Shared<T, L>>();
        // SAFETY: the block is large enough and aligned for `Shared`.
        unsafe {
            ptr.as_ptr().write(Shared {
                count: AtomicUsize::new(1),
                pool,
                resource,
            });
        }
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Get reference to the resource.
    pub fn get(&self) -> &T {
        &self.shared().resource
    }

    /// Get mutable reference to the resource if this is its only handle.
    /// Otherwise, return `None`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<String> = Pool::default();
    /// let mut item = pool.allocate();
    /// item.get_mut().unwrap().push_str("hello");
    /// let shared = item.clone();
    /// assert!(item.get_mut().is_none());
    /// assert_eq!(&*shared, "hello");
    /// ```
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.shared().count.load(Acquire) == 1 {
            // SAFETY: no other clone exists, and `&mut self` stops new ones
            // from being made.
            Some(unsafe { self.get_mut_unchecked() })
        } else {
            None
        }
    }

    /// Get mutable reference to the resource without checking for other
    /// handles.
    ///
    /// # Safety
    ///
    /// No other clone of this handle may exist.
    pub(crate) unsafe fn get_mut_unchecked(&mut self) -> &mut T {
        unsafe { &mut (*self.ptr.as_ptr()).resource }
    }

    /// Number of handles sharing this resource.
    pub fn strong_count(this: &Self) -> usize {
        this.shared().count.load(Acquire)
    }

    /// Whether two handles share the same resource.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    #[inline]
    fn shared(&self) -> &Shared<T, L> {
        // SAFETY: the block stays initialized while any clone is alive.
        unsafe { self.ptr.as_ref() }
    }

    /// Hand the resource and its block back after the last clone is gone.
    ///
    /// # Safety
    ///
    /// Must be called once, by the clone that dropped the count to zero.
    #[inline(never)]
    unsafe fn release(&mut self) {
        let block = self.ptr.cast::<u8>();
        // SAFETY: no other clone can read the block anymore. Moving the
        // resource out first means nothing it owns can keep the block or the
        // release path alive.
        let Shared { pool, resource, .. } = unsafe { self.ptr.as_ptr().read() };

        match pool.upgrade() {
            Some(core) => {
                drop(pool);
                // SAFETY: the block holds no live value and was laid out for
                // this pool's handles.
                unsafe { core.recycle(block, resource) };
            }
            None => {
                trace!("pool already dropped, releasing resource");
                // SAFETY: the block holds no live value.
                unsafe { BlockCache::deallocate(block, Self::block_layout()) };
                drop(resource);
            }
        }
    }
}

impl<T, L: LockingPolicy> Clone for Handle<T, L> {
    /// Makes a clone of the `Handle` that shares the same resource.
    fn clone(&self) -> Self {
        let old = self.shared().count.fetch_add(1, Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T, L: LockingPolicy> Drop for Handle<T, L> {
    fn drop(&mut self) {
        if self.shared().count.fetch_sub(1, Release) != 1 {
            return;
        }
        fence(Acquire);
        // SAFETY: this was the last reference.
        unsafe { self.release() };
    }
}

impl<T, L: LockingPolicy> Deref for Handle<T, L> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<T, L: LockingPolicy> AsRef<T> for Handle<T, L> {
    fn as_ref(&self) -> &T {
        self.get()
    }
}

impl<T, L: LockingPolicy> Borrow<T> for Handle<T, L> {
    fn borrow(&self) -> &T {
        self.get()
    }
}

impl<T: PartialEq, L: LockingPolicy> PartialEq for Handle<T, L> {
    fn eq(&self, other: &Self) -> bool {
        self.get().eq(other.get())
    }
}

impl<T: Eq, L: LockingPolicy> Eq for Handle<T, L> {}

impl<T: PartialOrd, L: LockingPolicy> PartialOrd for Handle<T, L> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.get().partial_cmp(other.get())
    }
}

impl<T: Ord, L: LockingPolicy> Ord for Handle<T, L> {
    /// Comparison for two `Handle`s by their resources.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycle_pool::Pool;
    ///
    /// let pool: Pool<usize> = Pool::default();
    /// let item1 = pool.allocate_with(|i| *i = 1);
    /// let item2 = pool.allocate_with(|i| *i = 2);
    /// assert!(item1 < item2);
    /// ```
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.get().cmp(other.get())
    }
}

impl<T: Hash, L: LockingPolicy> Hash for Handle<T, L> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.get().hash(state)
    }
}

impl<T: Debug, L: LockingPolicy> Debug for Handle<T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.get().fmt(f)
    }
}

impl<T: Display, L: LockingPolicy> Display for Handle<T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.get().fmt(f)
    }
}

#[cfg(feature = "serde")]
impl<T: serde::Serialize, L: LockingPolicy> serde::Serialize for Handle<T, L> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.get().serialize(serializer)
    }
}
