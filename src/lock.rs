use std::cell::{RefCell, RefMut};
use std::ops::DerefMut;

/// A lock around a value of type `S`.
///
/// The guard returned by [`lock`](Lockable::lock) is the scoped lock: access
/// to the value is exclusive while it lives and the lock is released when it
/// is dropped, including during unwinding.
pub trait Lockable<S> {
    /// The scoped lock type.
    type Guard<'a>: DerefMut<Target = S>
    where
        Self: 'a;

    /// Wrap `value` in a new lock.
    fn new(value: S) -> Self;

    /// Acquire exclusive access to the value.
    fn lock(&self) -> Self::Guard<'_>;
}

/// Selects the lock a [`Pool`](crate::Pool) uses to guard its shared state.
///
/// The pool never runs user code (allocation functions, recycle functions or
/// resource destructors) while holding the lock, so a policy does not need to
/// support re-entrant locking.
pub trait LockingPolicy: 'static {
    /// The lock type wrapping the pool state.
    type Lock<S>: Lockable<S>;
}

/// Locking policy for pools used from a single thread.
///
/// No synchronization happens. Pools and handles using this policy are
/// neither `Send` nor `Sync`.
///
/// # Example
///
/// ```rust
/// use recycle_pool::{NoLocking, Pool};
///
/// let pool: Pool<Vec<u8>, NoLocking> = Pool::new(|| Vec::with_capacity(64));
/// let buf = pool.allocate();
/// assert!(buf.capacity() >= 64);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocking;

impl LockingPolicy for NoLocking {
    type Lock<S> = NoLock<S>;
}

/// The lock of the [`NoLocking`] policy.
#[derive(Debug)]
pub struct NoLock<S>(RefCell<S>);

impl<S> Lockable<S> for NoLock<S> {
    type Guard<'a>
        = RefMut<'a, S>
    where
        Self: 'a;

    #[inline]
    fn new(value: S) -> Self {
        Self(RefCell::new(value))
    }

    #[inline]
    fn lock(&self) -> Self::Guard<'_> {
        self.0.borrow_mut()
    }
}

/// Locking policy for pools shared between threads, backed by
/// [`parking_lot::Mutex`].
///
/// # Example
///
/// ```rust
/// use recycle_pool::{MutexLocking, Pool};
///
/// let pool: Pool<String, MutexLocking> = Pool::new(String::new);
/// std::thread::scope(|s| {
///     for _ in 0..4 {
///         s.spawn(|| {
///             let item = pool.allocate();
///             assert!(item.is_empty());
///         });
///     }
/// });
/// assert!(pool.unused_resources() >= 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MutexLocking;

impl LockingPolicy for MutexLocking {
    type Lock<S> = parking_lot::Mutex<S>;
}

impl<S> Lockable<S> for parking_lot::Mutex<S> {
    type Guard<'a>
        = parking_lot::MutexGuard<'a, S>
    where
        Self: 'a;

    #[inline]
    fn new(value: S) -> Self {
        parking_lot::Mutex::new(value)
    }

    #[inline]
    fn lock(&self) -> Self::Guard<'_> {
        parking_lot::Mutex::lock(self)
    }
}
